//! Capability traits for the collaborators this crate consumes.
//!
//! The process core never touches page tables, executable images or the
//! scheduler directly; it calls through these traits and only relies on
//! the success/failure contracts documented here. The embedding kernel
//! implements them once and hands a [`KernelHal`] to [`Kernel::new`].
//!
//! [`Kernel::new`]: crate::Kernel::new

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::any::Any;

use axerrno::LinuxResult;

use crate::{Process, TrapContext};

/// A user address space, owned exclusively by one process while it is
/// alive. Dropping the box releases the space.
pub trait AddressSpace: Send + Sync {
    /// Duplicates the whole space into an independent copy owned solely
    /// by the caller (copy-on-write or eager, the implementation's
    /// choice). Fails with `ENOMEM` when backing memory runs out.
    fn duplicate(&self) -> LinuxResult<Box<dyn AddressSpace>>;

    /// Makes this space the one the MMU translates through.
    fn activate(&self);

    /// Copies `buf.len()` bytes from user address `uaddr` into `buf`.
    /// `EFAULT` if the range is not readable user memory.
    fn copy_in(&self, uaddr: usize, buf: &mut [u8]) -> LinuxResult<()>;

    /// Copies a NUL-terminated string starting at `uaddr`, up to
    /// `max_len` bytes including the terminator. Returns the bytes
    /// without the terminator; `ENAMETOOLONG` if no terminator was found
    /// within the bound, `EFAULT` on an unreadable range.
    fn copy_in_str(&self, uaddr: usize, max_len: usize) -> LinuxResult<Vec<u8>>;

    /// Copies `bytes` to user address `uaddr`. `EFAULT` if the range is
    /// not writable user memory.
    fn copy_out(&self, uaddr: usize, bytes: &[u8]) -> LinuxResult<()>;
}

/// An open filesystem object (an executable, a working directory).
/// Shared by reference count; the last drop closes it.
pub trait Vnode: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// The blocking half of a process record's exit/wait handshake,
/// condition-variable shaped: waiters block until the predicate holds,
/// rechecking it after every wakeup so spurious and unrelated wakeups
/// are tolerated.
pub trait WaitQueue: Send + Sync {
    /// Blocks the calling thread until `condition` returns true. The
    /// condition must be evaluated in a way that cannot miss a
    /// [`notify_all`] issued after it last returned false.
    ///
    /// [`notify_all`]: WaitQueue::notify_all
    fn wait_until(&self, condition: &mut dyn FnMut() -> bool);

    /// Wakes every thread currently blocked in [`wait_until`].
    ///
    /// [`wait_until`]: WaitQueue::wait_until
    fn notify_all(&self);
}

/// Everything the scheduler needs to start a forked child's first thread
/// of control.
pub struct ForkedChild {
    /// The freshly registered child record.
    pub process: Arc<Process>,
    /// The duplicated trap context the child resumes with (return-value
    /// slot already zeroed, program counter already advanced).
    pub ctx: TrapContext,
}

/// The bundle of collaborator capabilities the process core runs on.
pub trait KernelHal: Send + Sync {
    /// Creates the wait queue embedded in a new process record. Called
    /// once per record, at record creation.
    fn new_wait_queue(&self) -> Box<dyn WaitQueue>;

    /// Creates a fresh, empty address space. `ENOMEM` on exhaustion.
    fn create_aspace(&self) -> LinuxResult<Box<dyn AddressSpace>>;

    /// Opens the executable at `path`. `ENOENT` if it does not resolve.
    fn open_executable(&self, path: &str) -> LinuxResult<Arc<dyn Vnode>>;

    /// Loads the program image held by `exe` into `aspace` and returns
    /// its entry point. `ENOEXEC` for an unloadable image, `ENOMEM` on
    /// exhaustion.
    fn load_image(&self, exe: &dyn Vnode, aspace: &mut dyn AddressSpace) -> LinuxResult<usize>;

    /// Reserves the user stack in `aspace` and returns its top.
    fn reserve_stack(&self, aspace: &mut dyn AddressSpace) -> LinuxResult<usize>;

    /// Schedules `child` as an independent thread of control. On error
    /// nothing may keep running; the fork path tears the child down.
    fn spawn(&self, child: ForkedChild) -> LinuxResult<()>;
}
