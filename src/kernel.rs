use alloc::sync::Arc;

use axerrno::LinuxResult;
use log::debug;

use crate::{
    Pid, Process,
    hal::KernelHal,
    process::NO_PARENT,
    table::ProcessTable,
};

/// The kernel context for the process core: the process table plus the
/// collaborator capabilities, bundled so it can be constructed and torn
/// down deterministically instead of living in a global.
///
/// The syscall dispatch layer holds one of these (shared behind an
/// [`Arc`]) and routes fork/exec/exit/waitpid traps into the `sys_*`
/// methods, passing the calling process's record along.
pub struct Kernel {
    pub(crate) table: ProcessTable,
    pub(crate) hal: Arc<dyn KernelHal>,
}

impl Kernel {
    /// Creates a kernel context that refuses to hold more than
    /// `max_procs` process records at once.
    pub fn new(hal: Arc<dyn KernelHal>, max_procs: usize) -> Self {
        Self {
            table: ProcessTable::new(max_procs),
            hal,
        }
    }

    /// Creates the first user process: no parent, a fresh address space.
    /// It counts against the process limit like any other record.
    pub fn init_process(&self) -> LinuxResult<Arc<Process>> {
        let process = self
            .table
            .register(|pid| Process::new(pid, NO_PARENT, self.hal.new_wait_queue()))?;
        match self.hal.create_aspace() {
            Ok(aspace) => process.install_aspace(aspace),
            Err(err) => {
                self.table.unregister(process.pid());
                return Err(err);
            }
        }
        debug!("init process: pid {}", process.pid());
        Ok(process)
    }

    /// The calling process's own pid.
    pub fn sys_getpid(&self, caller: &Arc<Process>) -> Pid {
        caller.pid()
    }

    /// Number of records currently held (live and unreaped).
    pub fn process_count(&self) -> usize {
        self.table.len()
    }
}
