//! Process Control Block
//!
//! The parts of a process the descriptor subsystem cares about: its
//! descriptor table and its pending-signal state.
//!
//! # Ownership
//! - The table is shared by the process's threads through an `Arc`
//! - A forked child gets its own table value; nothing is shared with the
//!   parent except the underlying objects' reference counts
//! - The table is torn down when the last thread lets go of it

use alloc::sync::Arc;

use log::debug;

use crate::fd::{DescriptorTable, FdResult, TableConfig};
use crate::sync::Signals;

/// Process identifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// A process, as seen by the descriptor syscalls.
#[derive(Debug)]
pub struct Process {
    pid: Pid,
    fds: Arc<DescriptorTable>,
    signals: Arc<Signals>,
}

impl Process {
    /// Create a process with an empty descriptor table.
    pub fn new(pid: Pid, config: TableConfig) -> FdResult<Self> {
        Ok(Self {
            pid,
            fds: Arc::new(DescriptorTable::with_config(config)?),
            signals: Arc::new(Signals::new()),
        })
    }

    /// Another thread of the same process: same table, same signals.
    pub fn spawn_thread(&self) -> Self {
        Self {
            pid: self.pid,
            fds: self.fds.clone(),
            signals: self.signals.clone(),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn fds(&self) -> &DescriptorTable {
        &self.fds
    }

    #[inline]
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Create a child with an inherited copy of the descriptor table.
    ///
    /// A signal while waiting for the parent's table aborts with
    /// `Interrupted` and creates nothing.
    pub fn fork(&self, child: Pid) -> FdResult<Self> {
        let fds = self.fds.lock_interruptible(&self.signals)?.fork()?;
        debug!(
            "[PROC] fork {} -> {} ({} descriptors inherited)",
            self.pid.as_u32(),
            child.as_u32(),
            fds.occupied_count()
        );
        Ok(Self {
            pid: child,
            fds: Arc::new(fds),
            signals: Arc::new(Signals::new()),
        })
    }

    /// The new image is committed: drop close-on-exec descriptors.
    pub fn commit_exec(&self) -> usize {
        let closed = self.fds.on_execute();
        debug!("[PROC] exec commit in {}: closed {}", self.pid.as_u32(), closed);
        closed
    }

    /// Close every descriptor of an exiting process.
    pub fn exit(&self) -> usize {
        let closed = self.fds.close_from(0);
        debug!("[PROC] exit of {}: closed {}", self.pid.as_u32(), closed);
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::{Descriptor, DescriptorRef, FdFlags};
    use crate::io::{pipe, NullDevice};

    fn process(pid: u32) -> Process {
        Process::new(Pid::new(pid), TableConfig::DEFAULT).unwrap()
    }

    #[test]
    fn test_threads_share_table() {
        let main = process(1);
        let thread = main.spawn_thread();
        let index = thread
            .fds()
            .allocate(Arc::new(NullDevice), FdFlags::empty(), 0)
            .unwrap();
        assert!(main.fds().get(index).is_some());
        main.signals().raise(10);
        assert!(thread.signals().is_pending());
    }

    #[test]
    fn test_fork_is_independent() {
        let parent = process(1);
        parent
            .fds()
            .allocate(Arc::new(NullDevice), FdFlags::empty(), 0)
            .unwrap();
        parent.signals().raise(2);

        let child = parent.fork(Pid::new(2)).unwrap();
        assert_eq!(child.pid(), Pid::new(2));
        assert!(!child.signals().is_pending());

        child.fds().free(0).unwrap();
        assert!(parent.fds().get(0).is_some());
    }

    #[test]
    fn test_pipe_closes_when_both_processes_exit() {
        let parent = process(1);
        let (reader, writer) = pipe();
        let reader: DescriptorRef = Arc::new(reader);
        let writer: DescriptorRef = Arc::new(writer);
        let read_fd = parent.fds().allocate(reader.clone(), FdFlags::empty(), 0).unwrap();
        let write_fd = parent.fds().allocate(writer, FdFlags::empty(), 0).unwrap();

        let child = parent.fork(Pid::new(2)).unwrap();
        parent.fds().free(write_fd).unwrap();

        let mut buf = [0u8; 1];
        assert!(reader.read(&mut buf).is_err());

        child.exit();
        assert_eq!(reader.read(&mut buf), Ok(0));
        assert!(parent.fds().get(read_fd).is_some());
    }

    #[test]
    fn test_commit_exec_and_exit() {
        let proc = process(7);
        proc.fds()
            .allocate(Arc::new(NullDevice), FdFlags::CLOEXEC, 0)
            .unwrap();
        proc.fds()
            .allocate(Arc::new(NullDevice), FdFlags::empty(), 0)
            .unwrap();
        assert_eq!(proc.commit_exec(), 1);
        assert_eq!(proc.exit(), 1);
        assert!(proc.fds().is_empty());
    }
}
