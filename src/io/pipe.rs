//! Pipes
//!
//! A bounded byte queue shared by a read end and a write end. Each end is
//! one descriptor object; duplicated or inherited descriptors share it, so
//! an end "closes" when its last reference is dropped.

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use spin::Mutex;

use crate::fd::{Descriptor, DescriptorKind, IoError, IoResult, PollEvents, Stat};

/// Bytes a pipe buffers before writers see `WouldBlock`.
pub const PIPE_CAPACITY: usize = 4096;

/// Queue shared by the two ends.
#[derive(Debug, Default)]
pub(crate) struct PipeBuffer {
    buffer: VecDeque<u8>,
    write_closed: bool,
    read_closed: bool,
}

impl PipeBuffer {
    pub(crate) fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if self.buffer.is_empty() {
            if self.write_closed {
                return Ok(0);
            }
            return Err(IoError::WouldBlock);
        }

        let count = buf.len().min(self.buffer.len());
        for (slot, byte) in buf.iter_mut().zip(self.buffer.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    pub(crate) fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        if self.read_closed {
            return Err(IoError::BrokenPipe);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let room = PIPE_CAPACITY - self.buffer.len();
        if room == 0 {
            return Err(IoError::WouldBlock);
        }
        let count = buf.len().min(room);
        self.buffer.extend(&buf[..count]);
        Ok(count)
    }

    pub(crate) fn read_events(&self) -> PollEvents {
        let mut events = PollEvents::empty();
        if !self.buffer.is_empty() {
            events |= PollEvents::IN;
        }
        if self.write_closed {
            events |= PollEvents::HUP;
        }
        events
    }

    pub(crate) fn write_events(&self) -> PollEvents {
        if self.read_closed {
            return PollEvents::ERR;
        }
        if self.buffer.len() < PIPE_CAPACITY {
            PollEvents::OUT
        } else {
            PollEvents::empty()
        }
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn close_write(&mut self) {
        self.write_closed = true;
    }

    pub(crate) fn close_read(&mut self) {
        self.read_closed = true;
        self.buffer.clear();
    }
}

/// Read end of a pipe.
#[derive(Debug)]
pub struct PipeReader {
    pipe: Arc<Mutex<PipeBuffer>>,
}

/// Write end of a pipe.
#[derive(Debug)]
pub struct PipeWriter {
    pipe: Arc<Mutex<PipeBuffer>>,
}

/// Create a connected pair of pipe ends.
pub fn pipe() -> (PipeReader, PipeWriter) {
    let pipe = PipeBuffer::shared();
    (
        PipeReader { pipe: pipe.clone() },
        PipeWriter { pipe },
    )
}

impl Descriptor for PipeReader {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Pipe
    }

    fn read(&self, buf: &mut [u8]) -> IoResult<usize> {
        self.pipe.lock().read(buf)
    }

    fn write(&self, _buf: &[u8]) -> IoResult<usize> {
        Err(IoError::InvalidInput)
    }

    fn stat(&self) -> Stat {
        Stat {
            kind: DescriptorKind::Pipe,
            size: self.pipe.lock().buffered() as u64,
        }
    }

    fn poll(&self) -> PollEvents {
        self.pipe.lock().read_events()
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.pipe.lock().close_read();
    }
}

impl Descriptor for PipeWriter {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Pipe
    }

    fn read(&self, _buf: &mut [u8]) -> IoResult<usize> {
        Err(IoError::InvalidInput)
    }

    fn write(&self, buf: &[u8]) -> IoResult<usize> {
        self.pipe.lock().write(buf)
    }

    fn stat(&self) -> Stat {
        Stat {
            kind: DescriptorKind::Pipe,
            size: self.pipe.lock().buffered() as u64,
        }
    }

    fn poll(&self) -> PollEvents {
        self.pipe.lock().write_events()
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.pipe.lock().close_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_pipe_transfer() {
        let (reader, writer) = pipe();
        assert_eq!(writer.write(b"hello"), Ok(5));
        assert_eq!(reader.stat().size, 5);
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf), Ok(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(reader.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"lo");
        assert_eq!(reader.read(&mut buf), Err(IoError::WouldBlock));
    }

    #[test]
    fn test_eof_after_writer_dropped() {
        let (reader, writer) = pipe();
        writer.write(b"x").unwrap();
        drop(writer);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf), Ok(1));
        assert_eq!(reader.read(&mut buf), Ok(0));
        assert!(reader.poll().contains(PollEvents::HUP));
    }

    #[test]
    fn test_broken_pipe_after_reader_dropped() {
        let (reader, writer) = pipe();
        drop(reader);
        assert_eq!(writer.write(b"x"), Err(IoError::BrokenPipe));
        assert_eq!(writer.poll(), PollEvents::ERR);
    }

    #[test]
    fn test_capacity_bound() {
        let (_reader, writer) = pipe();
        let big = vec![7u8; PIPE_CAPACITY + 10];
        assert_eq!(writer.write(&big), Ok(PIPE_CAPACITY));
        assert_eq!(writer.write(b"more"), Err(IoError::WouldBlock));
        assert!(writer.poll().is_empty());
    }

    #[test]
    fn test_wrong_direction() {
        let (reader, writer) = pipe();
        let mut buf = [0u8; 1];
        assert_eq!(reader.write(b"x"), Err(IoError::InvalidInput));
        assert_eq!(writer.read(&mut buf), Err(IoError::InvalidInput));
    }
}
