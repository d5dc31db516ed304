pub mod dispatcher;
pub mod driver;
pub mod job;

pub use dispatcher::Dispatcher;
pub use driver::{Sim, SimReport};
pub use job::{FileOp, FileOpKind, ProcessRecord, ProcessSummary};
