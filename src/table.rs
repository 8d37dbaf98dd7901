use alloc::{collections::btree_map::BTreeMap, sync::Arc};

use axerrno::{LinuxError, LinuxResult};
use kspin::SpinNoIrq;

use crate::{Pid, Process, process::NO_PARENT};

/// The shared registry mapping pids to process records.
///
/// One table-wide lock serializes all structural mutation: insertion,
/// removal and the orphan-reparenting sweep. Blocking waits never happen
/// under this lock; they go through each record's own handshake.
pub(crate) struct ProcessTable {
    procs: SpinNoIrq<BTreeMap<Pid, Arc<Process>>>,
    max_procs: usize,
}

impl ProcessTable {
    pub(crate) fn new(max_procs: usize) -> Self {
        Self {
            procs: SpinNoIrq::new(BTreeMap::new()),
            max_procs,
        }
    }

    /// Reserves the lowest currently-unused pid and registers the record
    /// built for it by `make`, atomically with respect to concurrent
    /// registrations. Fails with `EAGAIN`, leaving the table unchanged,
    /// once `max_procs` records (live or unreaped) are held.
    pub(crate) fn register(
        &self,
        make: impl FnOnce(Pid) -> Arc<Process>,
    ) -> LinuxResult<Arc<Process>> {
        let mut procs = self.procs.lock();
        if procs.len() >= self.max_procs {
            return Err(LinuxError::EAGAIN);
        }
        // Every issued pid is <= max_procs, so a table below capacity
        // always has a free pid in range.
        let pid = (1..=self.max_procs as Pid)
            .find(|pid| !procs.contains_key(pid))
            .expect("no free pid below the process limit");
        let process = make(pid);
        procs.insert(pid, process.clone());
        Ok(process)
    }

    /// Rolls a half-constructed record back out of the table (fork
    /// failure path). Dropping the table's reference releases whatever
    /// resources were already attached.
    pub(crate) fn unregister(&self, pid: Pid) {
        self.procs.lock().remove(&pid);
    }

    pub(crate) fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        let record = self.procs.lock().get(&pid).cloned();
        if let Some(record) = &record {
            assert_eq!(
                record.pid(),
                pid,
                "process table key does not match record pid"
            );
        }
        record
    }

    pub(crate) fn len(&self) -> usize {
        self.procs.lock().len()
    }

    /// The table half of `exit`: decides, under the table lock, who
    /// reclaims the record. With no live parent the exiting process is
    /// responsible for itself: its children are reparented to the orphan
    /// sentinel and its record is removed. With a live parent the record
    /// stays, exited, for the parent to reap.
    pub(crate) fn finish_exit(&self, process: &Process) {
        let mut procs = self.procs.lock();
        let ppid = process.parent_raw();
        let parent_live = ppid != NO_PARENT && procs.get(&ppid).is_some_and(|p| p.is_alive());
        if !parent_live {
            orphan_children(&procs, process.pid());
            procs.remove(&process.pid());
        }
    }

    /// Reaps an exited record: reparents its children to the orphan
    /// sentinel and removes it, returning it so the caller can read the
    /// status after the structural work is done. `None` if the record
    /// was already reclaimed.
    pub(crate) fn reap(&self, pid: Pid) -> Option<Arc<Process>> {
        let mut procs = self.procs.lock();
        let record = procs.remove(&pid)?;
        assert_eq!(
            record.pid(),
            pid,
            "process table key does not match record pid"
        );
        debug_assert!(!record.is_alive(), "reaping a running process");
        orphan_children(&procs, pid);
        Some(record)
    }
}

/// Reassigns every child of `pid` to the orphan sentinel. Safe against
/// concurrent exits of the children: it only compares and clears their
/// single-word parent field, under the table lock held by the caller.
fn orphan_children(procs: &BTreeMap<Pid, Arc<Process>>, pid: Pid) {
    for child in procs.values() {
        if child.parent_raw() == pid {
            child.clear_parent();
        }
    }
}
