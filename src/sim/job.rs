use crate::config::KernelConfig;
use crate::core::{Demand, Pid, Tier, Ticks};
use crate::{KernelError, KernelResult};

/// One line of the process description file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub arrival_delay: Ticks,
    // 0 = real-time, 1..=5 user
    pub tier: u32,
    pub total_cpu: Ticks,
    pub memory_size: usize,
    pub printer: u32,
    pub scanner: u32,
    pub modem: u32,
    pub port: u32,
}

impl ProcessRecord {
    pub fn demand(&self) -> KernelResult<Demand> {
        Demand::from_selectors(self.printer, self.scanner, self.modem, self.port)
            .map_err(|e| KernelError::InvalidRecord(e.to_string()))
    }

    /// Reject records that could never be admitted under `config`.
    pub fn validate(&self, config: &KernelConfig) -> KernelResult<()> {
        let tier = Tier::from_raw(self.tier)?;
        self.demand()?;
        if self.total_cpu == 0 {
            return Err(KernelError::InvalidRecord("cpu time must be positive".into()));
        }
        let capacity = match tier {
            Tier::RealTime => config.rt_blocks,
            Tier::User(_) => config.memory_blocks - config.rt_blocks,
        };
        if self.memory_size == 0 || self.memory_size > capacity {
            return Err(KernelError::InvalidSize {
                size: self.memory_size,
                capacity,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpKind {
    Create { size: usize },
    Delete,
}

/// One queued file-system operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOp {
    pub pid: Pid,
    pub kind: FileOpKind,
    pub name: String,
}

/// Outcome summary of an admitted process, taken when scheduling ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub pid: Pid,
    pub tier: Tier,
    pub admitted_at: Ticks,
    pub first_run: Option<Ticks>,
    pub completion_time: Option<Ticks>,
}

impl ProcessSummary {
    pub fn turnaround(&self) -> Option<Ticks> {
        self.completion_time.map(|done| done - self.admitted_at)
    }

    pub fn response(&self) -> Option<Ticks> {
        self.first_run.map(|start| start - self.admitted_at)
    }
}
