//! Process lifecycle management for a teaching kernel.
//!
//! This crate implements the process table and the exit/wait
//! synchronization protocol, together with the fork/exec state
//! transitions that populate and mutate it. Virtual memory, program
//! loading, the filesystem and the raw thread/scheduler primitives are
//! consumed through capability traits ([`KernelHal`], [`AddressSpace`],
//! [`WaitQueue`]); a syscall dispatch layer is expected to sit on top and
//! route traps into the `sys_*` entry points on [`Kernel`].

#![no_std]

extern crate alloc;

mod context;
mod exec;
mod fork;
mod hal;
mod kernel;
mod process;
mod table;
mod wait;

/// Process id.
pub type Pid = u32;

/// Longest executable path accepted by `execv`, terminator included.
pub const PATH_MAX: usize = 1024;
/// Longest single argument string accepted by `execv`, terminator included.
pub const ARG_MAX: usize = 4096;
/// Most argument strings accepted by `execv`.
pub const NARG_MAX: usize = 64;

pub use context::TrapContext;
pub use hal::{AddressSpace, ForkedChild, KernelHal, Vnode, WaitQueue};
pub use kernel::Kernel;
pub use process::{NO_PARENT, Process};
pub use wait::WaitStatus;
