//! Socket Pairs
//!
//! Two connected, bidirectional stream endpoints built from a pair of
//! pipe buffers crossing each other.

use alloc::sync::Arc;

use spin::Mutex;

use super::pipe::PipeBuffer;
use crate::fd::{Descriptor, DescriptorKind, IoResult, PollEvents, Stat};

/// One endpoint of a connected socket pair.
#[derive(Debug)]
pub struct SocketEnd {
    rx: Arc<Mutex<PipeBuffer>>,
    tx: Arc<Mutex<PipeBuffer>>,
}

/// Create a connected pair of stream endpoints.
pub fn socket_pair() -> (SocketEnd, SocketEnd) {
    let a_to_b = PipeBuffer::shared();
    let b_to_a = PipeBuffer::shared();
    (
        SocketEnd {
            rx: b_to_a.clone(),
            tx: a_to_b.clone(),
        },
        SocketEnd {
            rx: a_to_b,
            tx: b_to_a,
        },
    )
}

impl Descriptor for SocketEnd {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Socket
    }

    fn read(&self, buf: &mut [u8]) -> IoResult<usize> {
        self.rx.lock().read(buf)
    }

    fn write(&self, buf: &[u8]) -> IoResult<usize> {
        self.tx.lock().write(buf)
    }

    fn stat(&self) -> Stat {
        Stat {
            kind: DescriptorKind::Socket,
            size: self.rx.lock().buffered() as u64,
        }
    }

    fn poll(&self) -> PollEvents {
        // One buffer lock at a time: the peer end locks them in the other order.
        let read = self.rx.lock().read_events();
        let write = self.tx.lock().write_events();
        read | write
    }
}

impl Drop for SocketEnd {
    fn drop(&mut self) {
        self.tx.lock().close_write();
        self.rx.lock().close_read();
    }
}
