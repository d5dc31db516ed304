pub mod driver;
pub mod event;
pub mod files;
pub mod handoff;
pub mod memory;
pub mod observer;
pub mod resources;
pub mod state;

pub use driver::SchedCore;
pub use event::KernelEvent;
pub use files::{DiskMap, ExistingFile, FileSystem};
pub use handoff::{AdmissionQueues, Handoff, Submission};
pub use memory::{MemoryPool, Zone};
pub use resources::{Demand, ResourceArbiter, Unit};
pub use state::{Channel, ChannelId, KernelCtx, Pid, Process, ProcessState, Ticks, Tier};
