//! In-Kernel I/O Objects
//!
//! Descriptor objects the syscall layer creates directly: pipes, socket
//! pairs and the null device. Files and other devices come from the VFS.

mod null;
mod pipe;
mod socket;

pub use null::NullDevice;
pub use pipe::{pipe, PipeReader, PipeWriter, PIPE_CAPACITY};
pub use socket::{socket_pair, SocketEnd};
