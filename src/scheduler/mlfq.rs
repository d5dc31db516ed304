use std::cmp;

use super::{KernelCtx, Pid, PriorityChange, Scheduler, Ticks};
use crate::config::{KernelConfig, USER_LEVELS};
use crate::core::{state::Tier, ChannelId};
use crate::KernelResult;

const USER_CHANNELS: [&str; USER_LEVELS] = ["U1", "U2", "U3", "U4", "U5"];
const WORST_PRIORITY: u8 = USER_LEVELS as u8;

/// Real-time FIFO with absolute precedence over five user FIFOs. User
/// processes are demoted after every unfinished slice and promoted back by
/// aging.
pub struct MlfqScheduler {
    rt: ChannelId,
    user: [ChannelId; USER_LEVELS],
    quanta: [Ticks; USER_LEVELS],
    aging_threshold: Ticks,
}

impl MlfqScheduler {
    fn user_channel(&self, priority: u8) -> ChannelId {
        self.user[(priority.clamp(1, WORST_PRIORITY) - 1) as usize]
    }

    fn quantum(&self, priority: u8) -> Ticks {
        self.quanta[(priority.clamp(1, WORST_PRIORITY) - 1) as usize]
    }

    // One bounded pass over a channel. Candidates that are skipped keep
    // their position.
    fn take_eligible(&self, ctx: &mut KernelCtx, channel: ChannelId) -> Option<Pid> {
        let candidates: Vec<Pid> = ctx.channel(channel).pids().collect();
        for pid in candidates {
            let process = ctx.process(pid);
            if !process.has_arrived() {
                tracing::trace!(pid, delay = process.arrival_delay, "not arrived, skipping");
                continue;
            }
            if !process.holds_demand() {
                if let Err(err) = ctx.acquire_resources(pid) {
                    tracing::trace!(pid, %err, "units unavailable, skipping");
                    continue;
                }
            }
            ctx.channel_remove(channel, pid);
            return Some(pid);
        }
        None
    }
}

impl Scheduler for MlfqScheduler {
    fn init(ctx: &mut KernelCtx, config: &KernelConfig) -> Self {
        let rt = ctx.create_channel("RT", true, config.queue_capacity);
        let user = USER_CHANNELS.map(|name| ctx.create_channel(name, false, config.queue_capacity));
        Self {
            rt,
            user,
            quanta: config.user_quanta,
            aging_threshold: config.aging_threshold,
        }
    }

    fn enqueue(&mut self, ctx: &mut KernelCtx, pid: Pid) -> KernelResult<()> {
        let process = ctx.process_mut(pid);
        let channel = match process.tier {
            Tier::RealTime => self.rt,
            Tier::User(_) => {
                process.current_priority = process.current_priority.clamp(1, WORST_PRIORITY);
                self.user_channel(process.current_priority)
            }
        };
        ctx.channel_push(channel, pid)
    }

    fn select_next(&mut self, ctx: &mut KernelCtx) -> Option<Pid> {
        // Real-time never waits for I/O units, it only has to have arrived.
        if let Some(pid) = self.take_eligible(ctx, self.rt) {
            return Some(pid);
        }
        self.user
            .iter()
            .find_map(|&channel| self.take_eligible(ctx, channel))
    }

    fn slice(&self, ctx: &KernelCtx, pid: Pid) -> Ticks {
        let process = ctx.process(pid);
        match process.tier {
            Tier::RealTime => process.remaining_cpu,
            Tier::User(_) => cmp::min(self.quantum(process.current_priority), process.remaining_cpu),
        }
    }

    fn requeue(&mut self, ctx: &mut KernelCtx, pid: Pid) -> KernelResult<PriorityChange> {
        let process = ctx.process_mut(pid);
        debug_assert!(!process.is_real_time(), "Real-time process {pid} cannot be preempted");

        let from = process.current_priority;
        let to = cmp::min(from + 1, WORST_PRIORITY);
        process.current_priority = to;
        process.aging_counter = 0;

        self.enqueue(ctx, pid)?;
        Ok(PriorityChange { pid, from, to })
    }

    fn age(&mut self, ctx: &mut KernelCtx, elapsed: Ticks) -> Vec<PriorityChange> {
        let mut changes = Vec::new();

        for pid in ctx.queued_pids() {
            let threshold = self.aging_threshold;
            let process = ctx.process_mut(pid);
            if !process.has_arrived() {
                process.arrival_delay = process.arrival_delay.saturating_sub(elapsed);
                continue;
            }
            if process.is_real_time() || process.current_priority == 1 {
                continue;
            }

            process.aging_counter += elapsed;
            let from = process.current_priority;
            while process.aging_counter >= threshold && process.current_priority > 1 {
                process.aging_counter -= threshold;
                process.current_priority -= 1;
            }
            if process.current_priority != from {
                changes.push(PriorityChange {
                    pid,
                    from,
                    to: process.current_priority,
                });
            }
        }

        // Promoted processes join the tail of their new channel.
        let threshold = self.aging_threshold;
        changes.retain(|change| {
            let target = self.user_channel(change.to);
            if ctx.channel(target).is_full() {
                tracing::debug!(pid = change.pid, "promotion target full, staying put");
                let process = ctx.process_mut(change.pid);
                process.current_priority = change.from;
                process.aging_counter += threshold * Ticks::from(change.from - change.to);
                return false;
            }
            ctx.channel_remove(self.user_channel(change.from), change.pid);
            ctx.channel_push(target, change.pid).is_ok()
        });
        changes
    }

    fn has_queued(&self, ctx: &KernelCtx) -> bool {
        ctx.channels.values().any(|channel| !channel.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Process, Unit};
    use crate::sim::ProcessRecord;

    fn setup() -> (KernelCtx, MlfqScheduler) {
        setup_with(&KernelConfig::default())
    }

    fn setup_with(config: &KernelConfig) -> (KernelCtx, MlfqScheduler) {
        let mut ctx = KernelCtx::new();
        let sched = MlfqScheduler::init(&mut ctx, config);
        (ctx, sched)
    }

    fn add(ctx: &mut KernelCtx, sched: &mut MlfqScheduler, tier: u32, scanner: u32) -> Pid {
        let record = ProcessRecord {
            arrival_delay: 0,
            tier,
            total_cpu: 10,
            memory_size: 1,
            printer: 0,
            scanner,
            modem: 0,
            port: 0,
        };
        let pid = ctx.processes.len();
        ctx.insert_process(Process::new(pid, &record, 0).unwrap());
        sched.enqueue(ctx, pid).unwrap();
        pid
    }

    #[test]
    fn test_real_time_wins_over_ready_user() {
        let (mut ctx, mut sched) = setup();
        let u = add(&mut ctx, &mut sched, 1, 0);
        let rt = add(&mut ctx, &mut sched, 0, 0);

        assert_eq!(sched.select_next(&mut ctx), Some(rt));
        assert_eq!(sched.select_next(&mut ctx), Some(u));
        assert_eq!(sched.select_next(&mut ctx), None);
    }

    #[test]
    fn test_user_channels_scan_best_first() {
        let (mut ctx, mut sched) = setup();
        let low = add(&mut ctx, &mut sched, 4, 0);
        let high = add(&mut ctx, &mut sched, 2, 0);

        assert_eq!(sched.select_next(&mut ctx), Some(high));
        assert_eq!(sched.select_next(&mut ctx), Some(low));
    }

    #[test]
    fn test_blocked_candidate_keeps_its_place() {
        let (mut ctx, mut sched) = setup();
        let blocked = add(&mut ctx, &mut sched, 1, 1);
        let next = add(&mut ctx, &mut sched, 1, 0);
        ctx.resources
            .request(99, &crate::core::Demand { scanner: true, ..Default::default() })
            .unwrap();

        assert_eq!(sched.select_next(&mut ctx), Some(next));
        let u1 = sched.user_channel(1);
        assert_eq!(ctx.channel(u1).pids().collect::<Vec<_>>(), vec![blocked]);
        assert!(ctx.process(blocked).granted.is_empty());

        ctx.resources.release(99);
        assert_eq!(sched.select_next(&mut ctx), Some(blocked));
        assert_eq!(ctx.process(blocked).granted, vec![Unit::Scanner]);
    }

    #[test]
    fn test_slice_lengths() {
        let (mut ctx, mut sched) = setup();
        let rt = add(&mut ctx, &mut sched, 0, 0);
        let u = add(&mut ctx, &mut sched, 3, 0);
        assert_eq!(sched.slice(&ctx, rt), 10);
        assert_eq!(sched.slice(&ctx, u), 4);
        ctx.process_mut(u).remaining_cpu = 1;
        assert_eq!(sched.slice(&ctx, u), 1);
    }

    #[test]
    fn test_requeue_demotes_and_resets_aging() {
        let (mut ctx, mut sched) = setup();
        let u = add(&mut ctx, &mut sched, 5, 0);
        assert_eq!(sched.select_next(&mut ctx), Some(u));
        ctx.process_mut(u).aging_counter = 4;

        let change = sched.requeue(&mut ctx, u).unwrap();
        assert_eq!(change, PriorityChange { pid: u, from: 5, to: 5 });
        assert_eq!(ctx.process(u).aging_counter, 0);
        assert_eq!(ctx.channel_of(u), Some(sched.user_channel(5)));
    }

    #[test]
    fn test_promotion_floors_at_best_priority() {
        let (mut ctx, mut sched) = setup();
        let u = add(&mut ctx, &mut sched, 3, 0);

        let changes = sched.age(&mut ctx, 100);
        assert_eq!(changes, vec![PriorityChange { pid: u, from: 3, to: 1 }]);
        assert_eq!(ctx.channel_of(u), Some(sched.user_channel(1)));
        assert!(sched.age(&mut ctx, 100).is_empty());
    }

    #[test]
    fn test_delayed_real_time_does_not_block_ready_one() {
        let (mut ctx, mut sched) = setup();
        let late = add(&mut ctx, &mut sched, 0, 0);
        ctx.process_mut(late).arrival_delay = 3;
        let ready = add(&mut ctx, &mut sched, 0, 0);

        assert_eq!(sched.select_next(&mut ctx), Some(ready));
        assert_eq!(ctx.channel_of(late), Some(sched.rt));
        assert_eq!(sched.select_next(&mut ctx), None);
    }

    #[test]
    fn test_skipped_candidates_stay_ahead() {
        let (mut ctx, mut sched) = setup();
        let blocked = add(&mut ctx, &mut sched, 2, 1);
        let first = add(&mut ctx, &mut sched, 2, 0);
        let second = add(&mut ctx, &mut sched, 2, 0);
        ctx.resources
            .request(99, &crate::core::Demand { scanner: true, ..Default::default() })
            .unwrap();

        assert_eq!(sched.select_next(&mut ctx), Some(first));
        let u2 = sched.user_channel(2);
        assert_eq!(ctx.channel(u2).pids().collect::<Vec<_>>(), vec![blocked, second]);
    }

    #[test]
    fn test_promotion_into_full_channel_is_reverted() {
        let config = KernelConfig {
            queue_capacity: 1,
            ..KernelConfig::default()
        };
        let (mut ctx, mut sched) = setup_with(&config);
        // Occupies U2 without aging itself.
        let occupant = add(&mut ctx, &mut sched, 2, 0);
        ctx.process_mut(occupant).arrival_delay = 100;
        let waiting = add(&mut ctx, &mut sched, 3, 0);

        assert!(sched.age(&mut ctx, 6).is_empty());
        assert_eq!(ctx.process(waiting).current_priority, 3);
        assert_eq!(ctx.channel_of(waiting), Some(sched.user_channel(3)));
        assert_eq!(ctx.process(waiting).aging_counter, 6);

        // The credit is kept, so the next pass promotes once there is room.
        ctx.channel_remove(sched.user_channel(2), occupant);
        assert_eq!(
            sched.age(&mut ctx, 0),
            vec![PriorityChange { pid: waiting, from: 3, to: 2 }]
        );
        assert_eq!(ctx.channel_of(waiting), Some(sched.user_channel(2)));
        assert_eq!(ctx.process(waiting).aging_counter, 0);
    }
}
