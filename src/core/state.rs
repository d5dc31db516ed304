use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use std::collections::VecDeque;
use std::fmt;

use super::memory::Zone;
use super::resources::{Demand, ResourceArbiter, Unit};
use crate::config::USER_LEVELS;
use crate::sim::ProcessRecord;
use crate::{KernelError, KernelResult};

// Index into the process table, assigned at admission
pub type Pid = usize;
pub type Ticks = u64;
new_key_type! {
    pub struct ChannelId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    RealTime,
    // 1 (best) ..= 5
    User(u8),
}

impl Tier {
    pub fn from_raw(tier: u32) -> KernelResult<Self> {
        match tier {
            0 => Ok(Tier::RealTime),
            p if p as usize <= USER_LEVELS => Ok(Tier::User(p as u8)),
            p => Err(KernelError::InvalidRecord(format!(
                "tier {p} outside 0..={USER_LEVELS}"
            ))),
        }
    }

    pub fn is_real_time(&self) -> bool {
        matches!(self, Tier::RealTime)
    }

    pub fn zone(&self) -> Zone {
        match self {
            Tier::RealTime => Zone::RealTime,
            Tier::User(_) => Zone::User,
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            Tier::RealTime => 0,
            Tier::User(p) => *p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    // Handed to the scheduler, not yet in a ready channel
    New,
    Queued,
    Running,
    Completed,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    pub state: ProcessState,
    pub tier: Tier,
    pub current_priority: u8,
    pub arrival_delay: Ticks,
    pub total_cpu: Ticks,
    pub remaining_cpu: Ticks,
    pub memory_size: usize,
    pub memory_offset: usize,
    pub demand: Demand,
    pub granted: Vec<Unit>,
    pub aging_counter: Ticks,
    pub admitted_at: Option<Ticks>,
    pub first_run: Option<Ticks>,
    pub completion_time: Option<Ticks>,
}

impl Process {
    /// Build a process from a validated record whose memory is already allocated.
    pub fn new(pid: Pid, record: &ProcessRecord, memory_offset: usize) -> KernelResult<Self> {
        let tier = Tier::from_raw(record.tier)?;
        let mut demand = record.demand()?;
        if tier.is_real_time() && !demand.is_empty() {
            tracing::warn!(pid, ?demand, "real-time process may not hold I/O units, ignoring demand");
            demand = Demand::default();
        }
        Ok(Self {
            pid,
            state: ProcessState::New,
            tier,
            current_priority: tier.raw(),
            arrival_delay: record.arrival_delay,
            total_cpu: record.total_cpu,
            remaining_cpu: record.total_cpu,
            memory_size: record.memory_size,
            memory_offset,
            demand,
            granted: Vec::new(),
            aging_counter: 0,
            admitted_at: None,
            first_run: None,
            completion_time: None,
        })
    }

    pub fn is_real_time(&self) -> bool {
        self.tier.is_real_time()
    }

    pub fn has_arrived(&self) -> bool {
        self.arrival_delay == 0
    }

    pub fn holds_demand(&self) -> bool {
        self.demand.units().all(|unit| self.granted.contains(&unit))
    }

    /// Number of the next instruction to execute, starting at 1.
    pub fn next_instruction(&self) -> Ticks {
        self.total_cpu - self.remaining_cpu + 1
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P{}(prio={}, rem={})",
            self.pid, self.current_priority, self.remaining_cpu
        )
    }
}

/// Bounded FIFO ready channel.
#[derive(Debug)]
pub struct Channel {
    pub name: &'static str,
    pub real_time: bool,
    pub capacity: usize,
    procs: VecDeque<Pid>,
}

impl Channel {
    pub fn new(name: &'static str, real_time: bool, capacity: usize) -> Self {
        Self {
            name,
            real_time,
            capacity,
            procs: VecDeque::with_capacity(capacity),
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.procs.contains(&pid)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.procs.len() >= self.capacity
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.procs.iter().copied()
    }
}

#[derive(Debug)]
pub struct KernelCtx {
    pub now: Ticks,
    pub processes: Vec<Process>,
    pub channels: SlotMap<ChannelId, Channel>,
    pub proc_to_channel: FxHashMap<Pid, ChannelId>,
    pub resources: ResourceArbiter,
    pub running: Option<Pid>,
    pub dropped: Vec<Pid>,
}

impl Default for KernelCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelCtx {
    pub fn new() -> Self {
        Self {
            now: 0,
            processes: Vec::new(),
            channels: SlotMap::with_key(),
            proc_to_channel: FxHashMap::default(),
            resources: ResourceArbiter::new(),
            running: None,
            dropped: Vec::new(),
        }
    }

    pub fn advance_time(&mut self, delta: Ticks) {
        self.now = self.now.saturating_add(delta);
    }

    pub fn create_channel(&mut self, name: &'static str, real_time: bool, capacity: usize) -> ChannelId {
        self.channels.insert(Channel::new(name, real_time, capacity))
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        self.channels.get(id).expect("Unknown channel")
    }

    /// Take ownership of a freshly admitted process.
    pub fn insert_process(&mut self, mut process: Process) -> Pid {
        let pid = process.pid;
        debug_assert_eq!(self.processes.len(), pid, "Pid must match table index");
        process.state = ProcessState::New;
        process.admitted_at = Some(self.now);
        self.processes.push(process);
        pid
    }

    pub fn channel_push(&mut self, id: ChannelId, pid: Pid) -> KernelResult<()> {
        assert!(
            !self.proc_to_channel.contains_key(&pid),
            "Process {pid} already present in some channel"
        );
        debug_assert!(
            self.running != Some(pid),
            "Process {pid} is running and cannot be enqueued"
        );

        let channel = self.channels.get_mut(id).expect("Unknown channel");
        if channel.is_full() {
            return Err(KernelError::ChannelFull {
                channel: channel.name,
                capacity: channel.capacity,
            });
        }
        channel.procs.push_back(pid);
        self.proc_to_channel.insert(pid, id);
        self.process_mut(pid).state = ProcessState::Queued;
        Ok(())
    }

    pub fn channel_pop(&mut self, id: ChannelId) -> Option<Pid> {
        let pid = self.channels.get_mut(id)?.procs.pop_front()?;
        let removed = self.proc_to_channel.remove(&pid);
        debug_assert!(removed.is_some(), "Process {pid} missing channel membership");
        Some(pid)
    }

    /// Remove `pid` from the middle of a channel, keeping the others in order.
    pub fn channel_remove(&mut self, id: ChannelId, pid: Pid) -> bool {
        let Some(channel) = self.channels.get_mut(id) else {
            return false;
        };
        let Some(pos) = channel.procs.iter().position(|&p| p == pid) else {
            return false;
        };
        channel.procs.remove(pos);
        self.proc_to_channel.remove(&pid);
        true
    }

    pub fn channel_of(&self, pid: Pid) -> Option<ChannelId> {
        self.proc_to_channel.get(&pid).copied()
    }

    pub fn queued_pids(&self) -> Vec<Pid> {
        self.channels.values().flat_map(Channel::pids).collect()
    }

    pub fn process(&self, pid: Pid) -> &Process {
        &self.processes[pid]
    }

    pub fn process_mut(&mut self, pid: Pid) -> &mut Process {
        &mut self.processes[pid]
    }

    pub fn set_running(&mut self, pid: Pid) {
        debug_assert!(
            !self.proc_to_channel.contains_key(&pid),
            "Running process {pid} must not be enqueued"
        );
        debug_assert!(self.running.is_none(), "CPU already running a process");

        self.running = Some(pid);
        let now = self.now;
        let process = self.process_mut(pid);
        process.state = ProcessState::Running;
        process.first_run.get_or_insert(now);
    }

    pub fn clear_running(&mut self) {
        self.running = None;
    }

    /// Grant every unit the process still lacks, all at once.
    pub fn acquire_resources(&mut self, pid: Pid) -> KernelResult<()> {
        let demand = self.process(pid).demand;
        let granted = self.resources.request(pid, &demand)?;
        self.process_mut(pid).granted = granted;
        Ok(())
    }

    pub fn release_resources(&mut self, pid: Pid) -> Vec<Unit> {
        let freed = self.resources.release(pid);
        self.process_mut(pid).granted.clear();
        freed
    }

    pub fn mark_completed(&mut self, pid: Pid) {
        debug_assert!(
            !self.proc_to_channel.contains_key(&pid),
            "Completing process {pid} that is still enqueued"
        );
        let now = self.now;
        let process = self.process_mut(pid);
        debug_assert!(
            process.state == ProcessState::Running,
            "Process {pid} must have been running before marked complete"
        );
        process.state = ProcessState::Completed;
        process.remaining_cpu = 0;
        process.completion_time = Some(now);
    }

    pub fn mark_dropped(&mut self, pid: Pid) {
        self.process_mut(pid).state = ProcessState::Dropped;
        self.dropped.push(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tier: u32, cpu: Ticks) -> ProcessRecord {
        ProcessRecord {
            arrival_delay: 0,
            tier,
            total_cpu: cpu,
            memory_size: 1,
            printer: 0,
            scanner: 0,
            modem: 0,
            port: 0,
        }
    }

    #[test]
    fn test_channel_membership_is_exclusive() {
        let mut ctx = KernelCtx::new();
        let a = ctx.create_channel("A", false, 2);
        let b = ctx.create_channel("B", false, 2);
        let pid = ctx.insert_process(Process::new(0, &record(1, 3), 0).unwrap());

        ctx.channel_push(a, pid).unwrap();
        assert_eq!(ctx.channel_of(pid), Some(a));
        assert!(ctx.channel_remove(a, pid));
        ctx.channel_push(b, pid).unwrap();
        assert_eq!(ctx.channel_pop(b), Some(pid));
        assert_eq!(ctx.channel_of(pid), None);
    }

    #[test]
    fn test_full_channel_rejects_push() {
        let mut ctx = KernelCtx::new();
        let ch = ctx.create_channel("U1", false, 1);
        for pid in 0..2 {
            ctx.insert_process(Process::new(pid, &record(1, 3), 0).unwrap());
        }
        ctx.channel_push(ch, 0).unwrap();
        assert_eq!(
            ctx.channel_push(ch, 1),
            Err(KernelError::ChannelFull {
                channel: "U1",
                capacity: 1
            })
        );
        assert_eq!(ctx.process(1).state, ProcessState::New);
    }

    #[test]
    fn test_real_time_demand_is_cleared() {
        let mut rec = record(0, 2);
        rec.printer = 1;
        rec.modem = 1;
        let process = Process::new(0, &rec, 0).unwrap();
        assert!(process.demand.is_empty());
        assert!(process.holds_demand());
    }

    #[test]
    fn test_tier_bounds() {
        assert_eq!(Tier::from_raw(0), Ok(Tier::RealTime));
        assert_eq!(Tier::from_raw(5), Ok(Tier::User(5)));
        assert!(Tier::from_raw(6).is_err());
    }
}
