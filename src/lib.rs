pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod scheduler;
pub mod sim;

pub use config::KernelConfig;
pub use error::{KernelError, KernelResult};
pub use scheduler::{MlfqScheduler, Scheduler};
pub use sim::{ProcessRecord, Sim};
