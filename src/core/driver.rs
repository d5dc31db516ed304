use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use super::{
    event::KernelEvent,
    handoff::Handoff,
    memory::MemoryPool,
    observer::Observer,
    state::{KernelCtx, Pid, Ticks},
};
use crate::config::KernelConfig;
use crate::scheduler::Scheduler;
use crate::KernelError;

pub struct SchedCore<S: Scheduler> {
    pub ctx: KernelCtx,
    pub scheduler: S,
    memory: Arc<Mutex<MemoryPool>>,
    handoff: Arc<Handoff>,
    // Taken from the handoff but not yet accepted by a channel
    backlog: VecDeque<Pid>,
    admission_closed: bool,
    observer: Observer,
}

impl<S: Scheduler> SchedCore<S> {
    pub fn new(config: &KernelConfig, memory: Arc<Mutex<MemoryPool>>, handoff: Arc<Handoff>) -> Self {
        let mut ctx = KernelCtx::new();
        let scheduler = S::init(&mut ctx, config);
        Self {
            ctx,
            scheduler,
            memory,
            handoff,
            backlog: VecDeque::new(),
            admission_closed: false,
            observer: Observer::new(),
        }
    }

    /// One scheduling decision: run a slice, or idle for one tick.
    pub fn step(&mut self) -> Vec<KernelEvent> {
        let mut events = Vec::new();
        self.drain_handoff();
        self.flush_backlog();

        match self.scheduler.select_next(&mut self.ctx) {
            Some(pid) => self.run_slice(pid, &mut events),
            None => {
                tracing::trace!(now = self.ctx.now, "idle");
                self.ctx.advance_time(1);
                self.age(1, &mut events);
            }
        }

        self.observer.observe(&self.ctx);
        events
    }

    /// Nothing queued and the admission side promised no more work.
    pub fn is_finished(&self) -> bool {
        self.admission_closed
            && self.backlog.is_empty()
            && !self.scheduler.has_queued(&self.ctx)
    }

    fn drain_handoff(&mut self) {
        let (arrived, closed) = self.handoff.take_inbound();
        for process in arrived {
            let pid = self.ctx.insert_process(process);
            tracing::debug!(pid, "taken from handoff");
            self.backlog.push_back(pid);
        }
        self.admission_closed = closed;
    }

    // Stops at the first full channel so admission order is kept.
    fn flush_backlog(&mut self) {
        while let Some(&pid) = self.backlog.front() {
            match self.scheduler.enqueue(&mut self.ctx, pid) {
                Ok(()) => {
                    self.backlog.pop_front();
                }
                Err(err) => {
                    tracing::warn!(pid, %err, "ready channel full, holding admission");
                    break;
                }
            }
        }
    }

    fn run_slice(&mut self, pid: Pid, events: &mut Vec<KernelEvent>) {
        let ticks = self.scheduler.slice(&self.ctx, pid);
        self.ctx.set_running(pid);

        let process = self.ctx.process_mut(pid);
        let first_instruction = process.next_instruction();
        let priority = (!process.is_real_time()).then_some(process.current_priority);
        process.remaining_cpu -= ticks;
        let remaining = process.remaining_cpu;
        self.ctx.advance_time(ticks);

        events.push(KernelEvent::SliceRan {
            pid,
            priority,
            first_instruction,
            ticks,
            remaining,
        });

        // Waiting processes age before the preempted one rejoins a channel.
        self.age(ticks, events);

        if remaining == 0 {
            self.finalize(pid);
            events.push(KernelEvent::Completed {
                pid,
                at: self.ctx.now,
            });
            return;
        }

        self.ctx.clear_running();
        match self.scheduler.requeue(&mut self.ctx, pid) {
            Ok(change) if change.from != change.to => events.push(KernelEvent::Demoted {
                pid,
                from: change.from,
                to: change.to,
            }),
            Ok(_) => {}
            Err(err) => self.drop_process(pid, err, events),
        }
    }

    fn age(&mut self, elapsed: Ticks, events: &mut Vec<KernelEvent>) {
        for change in self.scheduler.age(&mut self.ctx, elapsed) {
            events.push(KernelEvent::Promoted {
                pid: change.pid,
                from: change.from,
                to: change.to,
            });
        }
    }

    fn finalize(&mut self, pid: Pid) {
        let freed = self.memory.lock().free(pid);
        let units = self.ctx.release_resources(pid);
        self.ctx.mark_completed(pid);
        self.ctx.clear_running();
        tracing::debug!(pid, blocks = freed, ?units, "process finished");
    }

    fn drop_process(&mut self, pid: Pid, reason: KernelError, events: &mut Vec<KernelEvent>) {
        tracing::error!(pid, %reason, "ready channel overflow, dropping process");
        self.memory.lock().free(pid);
        self.ctx.release_resources(pid);
        self.ctx.mark_dropped(pid);
        events.push(KernelEvent::ProcessDropped { pid, reason });
    }

    pub fn now(&self) -> Ticks {
        self.ctx.now
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }
}
