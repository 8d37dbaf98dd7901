use alloc::{boxed::Box, sync::Arc};
use core::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use kspin::SpinNoIrq;

use crate::{
    Pid,
    hal::{AddressSpace, Vnode, WaitQueue},
};

/// Sentinel parent pid meaning "no parent / orphaned".
pub const NO_PARENT: Pid = 0;

/// Lifecycle state of a [`Process`] record. The terminal `RECLAIMED`
/// state of the protocol is represented by the record no longer being in
/// the table; a record never transitions backward.
enum ProcessState {
    Running,
    Exited(i32),
}

/// A process record (PCB): one per live or not-yet-reaped process.
///
/// The record is owned by the process table; everyone else, parents and
/// children included, refers to it by pid and resolves through the table
/// on demand. `state` together with `wakeup` forms the exit/wait
/// handshake: `state`'s lock is the handshake lock and guards exactly
/// the alive/exit-status pair, `wakeup` is the condition variable
/// broadcast at exit.
pub struct Process {
    pid: Pid,
    /// Parent pid or [`NO_PARENT`]. A single word: the reparenting sweep
    /// compares and clears it under the table lock without ever
    /// dereferencing another record.
    parent: AtomicU32,
    state: SpinNoIrq<ProcessState>,
    wakeup: Box<dyn WaitQueue>,
    aspace: SpinNoIrq<Option<Box<dyn AddressSpace>>>,
    cwd: SpinNoIrq<Option<Arc<dyn Vnode>>>,
}

impl Process {
    pub(crate) fn new(pid: Pid, parent: Pid, wakeup: Box<dyn WaitQueue>) -> Arc<Self> {
        Arc::new(Self {
            pid,
            parent: AtomicU32::new(parent),
            state: SpinNoIrq::new(ProcessState::Running),
            wakeup,
            aspace: SpinNoIrq::new(None),
            cwd: SpinNoIrq::new(None),
        })
    }

    /// The [`Process`] ID.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// The parent's pid, or `None` once orphaned.
    pub fn parent_pid(&self) -> Option<Pid> {
        match self.parent_raw() {
            NO_PARENT => None,
            pid => Some(pid),
        }
    }

    /// Whether the process has not yet called exit.
    pub fn is_alive(&self) -> bool {
        matches!(*self.state.lock(), ProcessState::Running)
    }

    pub(crate) fn parent_raw(&self) -> Pid {
        self.parent.load(Ordering::Acquire)
    }

    /// Reparents the record to the orphan sentinel. Caller holds the
    /// table lock.
    pub(crate) fn clear_parent(&self) {
        self.parent.store(NO_PARENT, Ordering::Release);
    }
}

/// Exit/wait handshake
impl Process {
    /// Records the exit status and broadcasts the handshake. The status
    /// is written exactly once, under the handshake lock, before the
    /// broadcast; a second exit of the same record is kernel corruption.
    pub(crate) fn set_exit(&self, code: i32) {
        {
            let mut state = self.state.lock();
            match *state {
                ProcessState::Running => *state = ProcessState::Exited(code),
                ProcessState::Exited(_) => panic!("process {} exited twice", self.pid),
            }
        }
        self.wakeup.notify_all();
    }

    /// Blocks until the record has exited, rechecking the predicate on
    /// every wakeup.
    pub(crate) fn wait_exited(&self) {
        self.wakeup.wait_until(&mut || !self.is_alive());
    }

    /// The recorded exit status. Reading it from a running record is
    /// kernel corruption.
    pub(crate) fn exit_status(&self) -> i32 {
        match *self.state.lock() {
            ProcessState::Exited(code) => code,
            ProcessState::Running => {
                panic!("exit status of process {} read before exit", self.pid)
            }
        }
    }
}

/// Owned resources
impl Process {
    /// Runs `f` against the process's address space. A live process
    /// always has one; calling this on a torn-down record is kernel
    /// corruption.
    pub fn with_aspace<R>(&self, f: impl FnOnce(&dyn AddressSpace) -> R) -> R {
        let guard = self.aspace.lock();
        let aspace = guard
            .as_deref()
            .expect("process has no address space");
        f(aspace)
    }

    pub(crate) fn install_aspace(&self, aspace: Box<dyn AddressSpace>) {
        *self.aspace.lock() = Some(aspace);
    }

    /// Swaps in a fresh image, returning the old space for the caller to
    /// release.
    pub(crate) fn replace_aspace(
        &self,
        aspace: Box<dyn AddressSpace>,
    ) -> Option<Box<dyn AddressSpace>> {
        self.aspace.lock().replace(aspace)
    }

    /// Releases the address space and the working-directory handle.
    /// Called once, at exit; only the pid/status bookkeeping survives
    /// for the reaper.
    pub(crate) fn release_resources(&self) {
        self.aspace.lock().take();
        self.cwd.lock().take();
    }

    /// The working-directory handle, if any.
    pub fn cwd(&self) -> Option<Arc<dyn Vnode>> {
        self.cwd.lock().clone()
    }

    /// Installs a working-directory handle, sharing it with whoever else
    /// holds the [`Arc`].
    pub fn set_cwd(&self, cwd: Arc<dyn Vnode>) {
        *self.cwd.lock() = Some(cwd);
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("parent", &self.parent_raw())
            .field("alive", &self.is_alive())
            .finish()
    }
}
