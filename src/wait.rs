use alloc::sync::Arc;

use axerrno::{LinuxError, LinuxResult};
use log::debug;

use crate::{Kernel, Pid, Process, process::NO_PARENT};

/// Decoded form of the wait-status word reported by `waitpid`.
///
/// Normal exit and signal termination share one word; only [`Exited`]
/// is ever produced by this core, [`Signaled`] exists so the encoding
/// distinguishes the two.
///
/// [`Exited`]: WaitStatus::Exited
/// [`Signaled`]: WaitStatus::Signaled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Normal termination with the given exit code.
    Exited(i32),
    /// Termination by the given signal.
    Signaled(u32),
}

impl WaitStatus {
    /// Packs the status into the wait-status word written through the
    /// `waitpid` status pointer.
    pub fn encode(self) -> i32 {
        match self {
            WaitStatus::Exited(code) => (code & 0xff) << 8,
            WaitStatus::Signaled(signo) => (signo & 0x7f) as i32,
        }
    }

    /// Unpacks a wait-status word.
    pub fn decode(word: i32) -> Self {
        if word & 0x7f == 0 {
            WaitStatus::Exited((word >> 8) & 0xff)
        } else {
            WaitStatus::Signaled((word & 0x7f) as u32)
        }
    }
}

impl Kernel {
    /// Terminates the calling process.
    ///
    /// Records the status and broadcasts the handshake, releases the
    /// address space and working directory, then settles reclamation
    /// under the table lock: with no live parent the record (and the
    /// orphan sweep over its children) is handled here, otherwise the
    /// exited record stays for the parent to reap.
    ///
    /// When this returns, the dispatch layer must terminate the calling
    /// thread of control; the process must never run user code again.
    pub fn sys_exit(&self, caller: &Arc<Process>, code: i32) {
        debug!("exit: {} status {}", caller.pid(), code);
        caller.set_exit(code);
        caller.release_resources();
        self.table.finish_exit(caller);
    }

    /// Waits for the process `pid` to exit and reaps it, returning its
    /// pid and encoded wait-status word.
    ///
    /// Only the recorded parent is a legitimate waiter; an exited record
    /// whose parent is already gone is unreachable by any legitimate
    /// waiter and is harvested by whoever asks. Blocking happens only in
    /// the target's handshake, never under the table lock.
    pub fn waitpid(&self, caller: &Arc<Process>, pid: Pid, options: u32) -> LinuxResult<(Pid, i32)> {
        if options != 0 {
            return Err(LinuxError::EINVAL);
        }
        let target = self.table.lookup(pid).ok_or(LinuxError::ESRCH)?;

        // While the target is alive, or exited with its parent still
        // recorded, only that parent may proceed; being a grandparent or
        // a sibling is not enough, even after the target has exited.
        let ppid = target.parent_raw();
        if (target.is_alive() || ppid != NO_PARENT) && ppid != caller.pid() {
            return Err(LinuxError::ECHILD);
        }

        if target.is_alive() {
            target.wait_exited();
        }

        let record = self.table.reap(pid).ok_or(LinuxError::ESRCH)?;
        let code = record.exit_status();
        debug!("waitpid: {} reaped {} status {}", caller.pid(), pid, code);
        Ok((pid, WaitStatus::Exited(code).encode()))
    }

    /// The `waitpid` syscall: [`waitpid`] plus the copy-out of the
    /// status word through `status_uptr` in the caller's address space.
    ///
    /// [`waitpid`]: Kernel::waitpid
    pub fn sys_waitpid(
        &self,
        caller: &Arc<Process>,
        pid: Pid,
        status_uptr: usize,
        options: u32,
    ) -> LinuxResult<Pid> {
        if status_uptr == 0 {
            return Err(LinuxError::EFAULT);
        }
        let (pid, status) = self.waitpid(caller, pid, options)?;
        caller.with_aspace(|aspace| aspace.copy_out(status_uptr, &status.to_ne_bytes()))?;
        Ok(pid)
    }
}
