pub mod mlfq;

use crate::config::KernelConfig;
use crate::core::{
    state::{KernelCtx, Pid},
    Ticks,
};
use crate::KernelResult;
pub use mlfq::MlfqScheduler;

/// Priority movement of a user process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityChange {
    pub pid: Pid,
    pub from: u8,
    pub to: u8,
}

/// Ready-queue policy. `SchedCore` owns the clock and executes slices; the
/// policy decides where processes wait and who runs next.
pub trait Scheduler {
    fn init(ctx: &mut KernelCtx, config: &KernelConfig) -> Self;

    /// Place a process at the tail of its channel.
    fn enqueue(&mut self, ctx: &mut KernelCtx, pid: Pid) -> KernelResult<()>;

    /// Remove and return the next process allowed to run, if any.
    fn select_next(&mut self, ctx: &mut KernelCtx) -> Option<Pid>;

    /// Ticks the selected process runs for before yielding.
    fn slice(&self, ctx: &KernelCtx, pid: Pid) -> Ticks;

    /// Re-enqueue a process whose slice ended before it finished.
    fn requeue(&mut self, ctx: &mut KernelCtx, pid: Pid) -> KernelResult<PriorityChange>;

    /// Credit `elapsed` waiting ticks to every queued process.
    fn age(&mut self, ctx: &mut KernelCtx, elapsed: Ticks) -> Vec<PriorityChange>;

    fn has_queued(&self, ctx: &KernelCtx) -> bool;
}
