//! Admission coordinator
//!
//! Turns process records into processes once their memory is allocated and
//! hands them to the scheduler. After scheduling ends it replays the queued
//! file operations.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use super::job::{FileOp, FileOpKind, ProcessRecord};
use crate::config::KernelConfig;
use crate::core::{
    AdmissionQueues, FileSystem, Handoff, KernelEvent, MemoryPool, Pid, Process, Submission, Tier,
};
use crate::{KernelError, KernelResult};

pub struct Dispatcher {
    config: KernelConfig,
    memory: Arc<Mutex<MemoryPool>>,
    handoff: Arc<Handoff>,
    events: Sender<KernelEvent>,
    next_pid: Pid,
    next_seq: usize,
    admitted: FxHashMap<Pid, Tier>,
}

enum Admission {
    Admitted(Process),
    Deferred(Submission),
    Rejected,
}

impl Dispatcher {
    pub fn new(
        config: KernelConfig,
        memory: Arc<Mutex<MemoryPool>>,
        handoff: Arc<Handoff>,
        events: Sender<KernelEvent>,
    ) -> Self {
        Self {
            config,
            memory,
            handoff,
            events,
            next_pid: 0,
            next_seq: 0,
            admitted: FxHashMap::default(),
        }
    }

    /// Queue records as newly arrived. Records that can never fit are
    /// rejected here.
    pub fn submit(&mut self, records: impl IntoIterator<Item = ProcessRecord>) {
        let mut queues = self.handoff.lock();
        for record in records {
            let seq = self.next_seq;
            self.next_seq += 1;
            if let Err(reason) = record.validate(&self.config) {
                tracing::warn!(seq, %reason, "rejecting process record");
                self.emit(KernelEvent::AdmissionRejected { seq, reason });
                continue;
            }
            queues.arrived.push_back(Submission { seq, record });
        }
    }

    /// Retry every pending record, then every newly arrived one. Returns how
    /// many processes were handed to the scheduler.
    pub fn pass(&mut self) -> usize {
        // Handoff lock first, memory lock per allocation inside try_admit.
        let handoff = Arc::clone(&self.handoff);
        let mut queues = handoff.lock();
        let mut admitted = 0;

        let pending = std::mem::take(&mut queues.pending);
        let arrived = std::mem::take(&mut queues.arrived);
        for submission in pending.into_iter().chain(arrived) {
            match self.try_admit(submission) {
                Admission::Admitted(process) => {
                    queues.inbound.push_back(process);
                    admitted += 1;
                }
                Admission::Deferred(submission) => queues.pending.push_back(submission),
                Admission::Rejected => {}
            }
        }
        admitted
    }

    fn try_admit(&mut self, submission: Submission) -> Admission {
        let Submission { seq, record } = submission;

        if let Some(cap) = self.config.max_processes {
            if self.next_pid >= cap {
                let reason = KernelError::InvalidRecord(format!("admission cap of {cap} reached"));
                tracing::warn!(seq, %reason, "rejecting process record");
                self.emit(KernelEvent::AdmissionRejected { seq, reason });
                return Admission::Rejected;
            }
        }

        let built = Tier::from_raw(record.tier).and_then(|tier| {
            let pid = self.next_pid;
            let offset = self.memory.lock().allocate(pid, record.memory_size, tier.zone())?;
            match Process::new(pid, &record, offset) {
                Ok(process) => Ok(process),
                Err(err) => {
                    self.memory.lock().free(pid);
                    Err(err)
                }
            }
        });

        match built {
            Ok(process) => {
                self.next_pid += 1;
                self.admitted.insert(process.pid, process.tier);
                tracing::debug!(pid = process.pid, seq, offset = process.memory_offset, "admitted");
                self.emit(KernelEvent::Admitted {
                    pid: process.pid,
                    offset: process.memory_offset,
                    blocks: process.memory_size,
                    tier: process.tier,
                    cpu: process.total_cpu,
                    demand: process.demand,
                });
                Admission::Admitted(process)
            }
            Err(KernelError::NoSpace { .. }) => {
                tracing::trace!(seq, size = record.memory_size, "no memory yet, deferring");
                Admission::Deferred(Submission { seq, record })
            }
            Err(reason) => {
                tracing::warn!(seq, %reason, "rejecting process record");
                self.emit(KernelEvent::AdmissionRejected { seq, reason });
                Admission::Rejected
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.handoff.has_pending_records()
    }

    /// Run passes until every record is admitted or rejected, then close the
    /// handoff.
    pub fn run_admission(&mut self) {
        let backoff = Duration::from_millis(self.config.admission_backoff_ms);
        loop {
            self.pass();
            if !self.has_pending() {
                break;
            }
            std::thread::sleep(backoff);
        }
        self.handoff.close();
        tracing::debug!(admitted = self.admitted.len(), "admission closed");
    }

    /// Apply file operations in order. A failure only affects its own operation.
    pub fn run_file_ops(&self, fs: &mut FileSystem, ops: &[FileOp]) -> Vec<Result<(), KernelError>> {
        ops.iter()
            .enumerate()
            .map(|(i, op)| {
                let result = self.apply(fs, op);
                if let Err(err) = &result {
                    tracing::debug!(index = i + 1, pid = op.pid, %err, "file operation failed");
                }
                self.emit(KernelEvent::FileOp {
                    index: i + 1,
                    pid: op.pid,
                    kind: op.kind,
                    name: op.name.clone(),
                    result: result.clone(),
                });
                result
            })
            .collect()
    }

    fn apply(&self, fs: &mut FileSystem, op: &FileOp) -> KernelResult<()> {
        let tier = self
            .admitted
            .get(&op.pid)
            .ok_or(KernelError::UnknownPid(op.pid))?;
        let privileged = tier.is_real_time();
        match op.kind {
            FileOpKind::Create { size } => fs.create(op.pid, &op.name, size, privileged).map(|_| ()),
            FileOpKind::Delete => fs.delete(op.pid, &op.name, privileged),
        }
    }

    pub fn admitted(&self) -> usize {
        self.admitted.len()
    }

    pub fn queues(&self) -> parking_lot::MutexGuard<'_, AdmissionQueues> {
        self.handoff.lock()
    }

    fn emit(&self, event: KernelEvent) {
        // The receiver going away only means nobody is printing.
        let _ = self.events.send(event);
    }
}
