use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;

use super::state::Process;
use crate::sim::ProcessRecord;

/// Record waiting for admission, tagged with its position in the input.
#[derive(Debug, Clone)]
pub struct Submission {
    pub seq: usize,
    pub record: ProcessRecord,
}

/// Everything the admission side and the scheduler exchange, behind one lock.
#[derive(Debug, Default)]
pub struct AdmissionQueues {
    // Admitted processes not yet taken by the scheduler
    pub inbound: VecDeque<Process>,
    // Records that failed memory allocation at least once
    pub pending: VecDeque<Submission>,
    // Records never tried
    pub arrived: VecDeque<Submission>,
    // No process will be produced after this is set
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct Handoff {
    queues: Mutex<AdmissionQueues>,
}

impl Handoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, AdmissionQueues> {
        self.queues.lock()
    }

    /// Drain the inbound list. The flag is read in the same critical section,
    /// so `true` means nothing will ever follow.
    pub fn take_inbound(&self) -> (Vec<Process>, bool) {
        let mut queues = self.queues.lock();
        let procs = queues.inbound.drain(..).collect();
        (procs, queues.closed)
    }

    pub fn close(&self) {
        self.queues.lock().closed = true;
    }

    pub fn has_pending_records(&self) -> bool {
        let queues = self.queues.lock();
        !queues.pending.is_empty() || !queues.arrived.is_empty()
    }
}
