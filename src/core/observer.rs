use super::state::{KernelCtx, ProcessState};

#[derive(Debug, Default)]
pub struct Observer {
    step: u64,
}

impl Observer {
    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn observe(&mut self, ctx: &KernelCtx) {
        self.step += 1;

        if let Some(pid) = ctx.running {
            debug_assert!(
                ctx.channel_of(pid).is_none(),
                "Running process {pid} must not appear in any channel"
            );
        }

        for (&pid, &channel_id) in &ctx.proc_to_channel {
            let process = ctx.process(pid);
            debug_assert_eq!(
                process.state,
                ProcessState::Queued,
                "Process {pid} in a channel must be Queued"
            );
            let Some(channel) = ctx.channels.get(channel_id) else {
                debug_assert!(false, "proc_to_channel references unknown channel {channel_id:?}");
                continue;
            };
            debug_assert!(
                channel.contains(pid),
                "proc_to_channel claims process {pid} in {}, but the channel does not contain it",
                channel.name
            );
            debug_assert_eq!(
                channel.real_time,
                process.is_real_time(),
                "Process {pid} queued in the wrong class of channel {}",
                channel.name
            );
        }

        let queued: usize = ctx.channels.values().map(|c| c.len()).sum();
        debug_assert_eq!(
            queued,
            ctx.proc_to_channel.len(),
            "Channel contents and membership map disagree"
        );

        for process in &ctx.processes {
            match process.state {
                ProcessState::Completed | ProcessState::Dropped => {
                    debug_assert!(
                        ctx.resources.held_by(process.pid).is_empty(),
                        "Finished process {} still holds units",
                        process.pid
                    );
                }
                _ => {
                    for &unit in &process.granted {
                        debug_assert_eq!(
                            ctx.resources.owner(unit),
                            Some(process.pid),
                            "Process {} believes it holds {unit}",
                            process.pid
                        );
                    }
                }
            }
        }
    }
}
