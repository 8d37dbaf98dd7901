use alloc::sync::Arc;

use axerrno::LinuxResult;
use log::debug;

use crate::{
    Kernel, Pid, Process, TrapContext,
    hal::ForkedChild,
};

impl Kernel {
    /// Creates a new process that resumes execution as if it had just
    /// returned from the same trap as the caller, observing a zero
    /// return value; the caller observes the child's pid.
    ///
    /// Registration is atomic with pid allocation, so two concurrent
    /// forks never share a pid. Any failure after the record is
    /// registered rolls the record and everything attached to it back
    /// out before the error is returned; a failed fork leaves no trace.
    pub fn sys_fork(&self, caller: &Arc<Process>, tf: &TrapContext) -> LinuxResult<Pid> {
        let child = self
            .table
            .register(|pid| Process::new(pid, caller.pid(), self.hal.new_wait_queue()))?;

        // Independent copy of the caller's address space, owned solely
        // by the child.
        match caller.with_aspace(|aspace| aspace.duplicate()) {
            Ok(aspace) => child.install_aspace(aspace),
            Err(err) => {
                self.table.unregister(child.pid());
                return Err(err);
            }
        }

        // The working directory is shared, not duplicated.
        if let Some(cwd) = caller.cwd() {
            child.set_cwd(cwd);
        }

        let ctx = tf.forked_child();
        if let Err(err) = self.hal.spawn(ForkedChild {
            process: child.clone(),
            ctx,
        }) {
            child.release_resources();
            self.table.unregister(child.pid());
            return Err(err);
        }

        debug!("fork: {} -> {}", caller.pid(), child.pid());
        Ok(child.pid())
    }
}
