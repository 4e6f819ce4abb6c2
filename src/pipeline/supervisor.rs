//! Process-group supervision
//!
//! Every pipeline runs in its own process group: the first stage is spawned as
//! a group leader and later stages join its group. The supervisor tracks the
//! live groups of a batch so that cancellation is one `killpg` per pipeline,
//! reaching every stage no matter how many processes it spawned.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Signal used to tear down pipelines
pub const CANCEL_SIGNAL: Signal = Signal::SIGTERM;

/// Registry of live pipeline process groups
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    cancelled: AtomicBool,
    groups: Mutex<HashSet<i32>>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new group. A group registered after cancellation is
    /// terminated immediately.
    pub fn register(&self, pgid: i32) -> GroupRegistration<'_> {
        let mut groups = self.lock_groups();
        groups.insert(pgid);
        if self.is_cancelled() {
            signal_group(pgid);
        }
        debug!("Registered process group {}", pgid);
        GroupRegistration {
            supervisor: self,
            pgid,
        }
    }

    /// Re-signal a group if the batch was cancelled while it was being built
    pub fn enforce(&self, pgid: i32) {
        let groups = self.lock_groups();
        if self.is_cancelled() && groups.contains(&pgid) {
            signal_group(pgid);
        }
    }

    /// Terminate every live group and refuse new work
    pub fn cancel(&self) {
        let groups = self.lock_groups();
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if !groups.is_empty() {
            warn!("Terminating {} running pipelines", groups.len());
        }
        for &pgid in groups.iter() {
            signal_group(pgid);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Group ids currently tracked
    pub fn live_groups(&self) -> Vec<i32> {
        self.lock_groups().iter().copied().collect()
    }

    fn unregister(&self, pgid: i32) {
        self.lock_groups().remove(&pgid);
    }

    fn lock_groups(&self) -> MutexGuard<'_, HashSet<i32>> {
        // The set stays consistent even if a holder panicked
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes a group from its supervisor when the pipeline has been reaped
#[derive(Debug)]
pub struct GroupRegistration<'a> {
    supervisor: &'a ProcessSupervisor,
    pgid: i32,
}

impl GroupRegistration<'_> {
    pub fn pgid(&self) -> i32 {
        self.pgid
    }
}

impl Drop for GroupRegistration<'_> {
    fn drop(&mut self) {
        self.supervisor.unregister(self.pgid);
    }
}

fn signal_group(pgid: i32) {
    match killpg(Pid::from_raw(pgid), CANCEL_SIGNAL) {
        Ok(()) => debug!("Sent {} to process group {}", CANCEL_SIGNAL, pgid),
        // Every member already exited
        Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to signal process group {}: {}", pgid, e),
    }
}

/// External cancellation, shared between a coordinator and e.g. a Ctrl-C handler
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    active: Mutex<Option<Arc<ProcessSupervisor>>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the running batch (if any) and every later one
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(supervisor) = self.lock_active().as_ref() {
            supervisor.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Route cancellation to a batch's supervisor until the returned guard drops
    pub(crate) fn attach(&self, supervisor: &Arc<ProcessSupervisor>) -> AttachedBatch<'_> {
        *self.lock_active() = Some(Arc::clone(supervisor));
        if self.is_cancelled() {
            supervisor.cancel();
        }
        AttachedBatch { handle: self }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Arc<ProcessSupervisor>>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) struct AttachedBatch<'a> {
    handle: &'a CancelHandle,
}

impl Drop for AttachedBatch<'_> {
    fn drop(&mut self) {
        *self.handle.lock_active() = None;
    }
}
