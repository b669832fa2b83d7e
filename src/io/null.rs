//! Null Device
//!
//! Reads hit end of file immediately; writes are discarded.

use crate::fd::{Descriptor, DescriptorKind, IoResult, PollEvents};

/// The `/dev/null` device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDevice;

impl Descriptor for NullDevice {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Device
    }

    fn read(&self, _buf: &mut [u8]) -> IoResult<usize> {
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> IoResult<usize> {
        Ok(buf.len())
    }

    fn poll(&self) -> PollEvents {
        PollEvents::IN | PollEvents::OUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_device() {
        let null = NullDevice;
        let mut buf = [0u8; 8];
        assert_eq!(null.read(&mut buf), Ok(0));
        assert_eq!(null.write(b"discard"), Ok(7));
        assert_eq!(null.stat().size, 0);
    }
}
