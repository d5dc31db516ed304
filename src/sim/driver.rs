use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use super::dispatcher::Dispatcher;
use super::job::{FileOp, ProcessRecord, ProcessSummary};
use crate::config::KernelConfig;
use crate::core::{
    driver::SchedCore, DiskMap, FileSystem, Handoff, KernelEvent, MemoryPool, Pid, Ticks,
};
use crate::scheduler::Scheduler;
use crate::{KernelError, KernelResult};

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimReport {
    pub processes: Vec<ProcessSummary>,
    pub dropped: Vec<Pid>,
    pub file_ops: Vec<Result<(), KernelError>>,
    pub disk_map: DiskMap,
    pub total_ticks: Ticks,
}

impl SimReport {
    pub fn processes_map<T>(&self, f: impl Fn(&ProcessSummary) -> Option<T>) -> Vec<T> {
        self.processes.iter().filter_map(f).collect()
    }

    pub fn completed(&self) -> usize {
        self.processes
            .iter()
            .filter(|p| p.completion_time.is_some())
            .count()
    }
}

// What the scheduler thread hands back when it finishes.
struct SchedulerOutcome {
    processes: Vec<ProcessSummary>,
    dropped: Vec<Pid>,
    total_ticks: Ticks,
}

/// Scheduler on its own thread, admission on the caller's thread.
pub struct Sim<S: Scheduler> {
    config: KernelConfig,
    memory: Arc<Mutex<MemoryPool>>,
    handoff: Arc<Handoff>,
    files: FileSystem,
    _scheduler: PhantomData<S>,
}

impl<S: Scheduler + 'static> Sim<S> {
    pub fn new(config: KernelConfig, files: FileSystem) -> KernelResult<Self> {
        config.validate()?;
        let memory = Arc::new(Mutex::new(MemoryPool::new(
            config.memory_blocks,
            config.rt_blocks,
        )));
        Ok(Self {
            config,
            memory,
            handoff: Arc::new(Handoff::new()),
            files,
            _scheduler: PhantomData,
        })
    }

    pub fn run(
        mut self,
        records: Vec<ProcessRecord>,
        file_ops: &[FileOp],
        events: Sender<KernelEvent>,
    ) -> KernelResult<SimReport> {
        let scheduler = {
            let config = self.config.clone();
            let memory = Arc::clone(&self.memory);
            let handoff = Arc::clone(&self.handoff);
            let events = events.clone();
            thread::Builder::new()
                .name("scheduler".into())
                .spawn(move || Self::schedule(&config, memory, handoff, events))?
        };

        let mut dispatcher = Dispatcher::new(
            self.config.clone(),
            Arc::clone(&self.memory),
            Arc::clone(&self.handoff),
            events.clone(),
        );
        dispatcher.submit(records);
        dispatcher.run_admission();

        let outcome = scheduler
            .join()
            .map_err(|_| KernelError::SchedulerPanicked)?;
        tracing::info!(
            ticks = outcome.total_ticks,
            admitted = dispatcher.admitted(),
            dropped = outcome.dropped.len(),
            "scheduling finished"
        );

        let file_ops = dispatcher.run_file_ops(&mut self.files, file_ops);
        let disk_map = self.files.occupancy_snapshot();
        let _ = events.send(KernelEvent::DiskMap(disk_map.clone()));

        Ok(SimReport {
            processes: outcome.processes,
            dropped: outcome.dropped,
            file_ops,
            disk_map,
            total_ticks: outcome.total_ticks,
        })
    }

    fn schedule(
        config: &KernelConfig,
        memory: Arc<Mutex<MemoryPool>>,
        handoff: Arc<Handoff>,
        events: Sender<KernelEvent>,
    ) -> SchedulerOutcome {
        let mut core = SchedCore::<S>::new(config, memory, handoff);
        loop {
            let stepped = core.step();
            let idle = stepped.is_empty();
            for event in stepped {
                let _ = events.send(event);
            }
            if core.is_finished() {
                break;
            }
            if idle {
                thread::yield_now();
            }
        }
        tracing::debug!(steps = core.observer().steps(), "scheduler loop done");

        SchedulerOutcome {
            processes: core
                .ctx
                .processes
                .iter()
                .map(|p| ProcessSummary {
                    pid: p.pid,
                    tier: p.tier,
                    admitted_at: p.admitted_at.unwrap_or_default(),
                    first_run: p.first_run,
                    completion_time: p.completion_time,
                })
                .collect(),
            dropped: core.ctx.dropped.clone(),
            total_ticks: core.now(),
        }
    }
}
