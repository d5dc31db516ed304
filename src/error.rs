//! Error types for the kernel model
//!
//! Most of these are non-fatal: the scheduler and the admission coordinator
//! turn them into events and keep going. Only configuration and input errors
//! abort a run.

use thiserror::Error;

use crate::core::{Pid, Unit};

/// Result type for kernel model operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Kernel model error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    // ========== Allocation Errors ==========

    /// No contiguous run of free blocks large enough
    #[error("no space for {size} contiguous blocks")]
    NoSpace { size: usize },

    /// Zero-sized or oversized request
    #[error("invalid allocation size {size} (zone holds {capacity} blocks)")]
    InvalidSize { size: usize, capacity: usize },

    // ========== Resource Errors ==========

    /// A requested unit is held by another process
    #[error("{unit} is held by process {owner}")]
    ResourceBusy { unit: Unit, owner: Pid },

    /// Selector outside the installed units
    #[error("no such unit: {0}")]
    UnknownUnit(String),

    // ========== Scheduling Errors ==========

    /// Target ready channel is at capacity
    #[error("ready channel {channel} is full (capacity {capacity})")]
    ChannelFull { channel: &'static str, capacity: usize },

    /// Process id not present in the table
    #[error("process {0} does not exist")]
    UnknownPid(Pid),

    // ========== File System Errors ==========

    /// No file with that name
    #[error("file {0} not found")]
    FileNotFound(String),

    /// Name already used by another file
    #[error("file {0} already exists")]
    FileExists(String),

    /// Caller may not delete the file
    #[error("process {pid} may not delete file {name}")]
    PermissionDenied { pid: Pid, name: String },

    /// Bootstrap extent overlaps another file or leaves the disk
    #[error("invalid extent for file {name}: offset {offset}, size {size}")]
    InvalidExtent {
        name: String,
        offset: usize,
        size: usize,
    },

    /// Empty or reserved file name
    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    // ========== Input Errors ==========

    /// Record that can never become a process
    #[error("invalid process record: {0}")]
    InvalidRecord(String),

    /// Malformed line in an input file
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// I/O failure reading inputs
    #[error("I/O error: {0}")]
    Io(String),

    /// Rejected configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Scheduler thread died
    #[error("scheduler thread panicked")]
    SchedulerPanicked,
}

impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        KernelError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KernelError::ResourceBusy {
            unit: Unit::Printer(2),
            owner: 4,
        };
        assert_eq!(err.to_string(), "printer 2 is held by process 4");

        let err = KernelError::Parse {
            line: 3,
            reason: "expected 8 fields".into(),
        };
        assert_eq!(err.to_string(), "line 3: expected 8 fields");
    }
}
