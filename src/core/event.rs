use std::fmt;

use crate::core::{DiskMap, Demand, Pid, Tier, Ticks};
use crate::sim::FileOpKind;
use crate::KernelError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    Admitted {
        pid: Pid,
        offset: usize,
        blocks: usize,
        tier: Tier,
        cpu: Ticks,
        demand: Demand,
    },
    AdmissionRejected {
        seq: usize,
        reason: KernelError,
    },
    SliceRan {
        pid: Pid,
        // None for real-time
        priority: Option<u8>,
        first_instruction: Ticks,
        ticks: Ticks,
        remaining: Ticks,
    },
    Completed {
        pid: Pid,
        at: Ticks,
    },
    Demoted {
        pid: Pid,
        from: u8,
        to: u8,
    },
    Promoted {
        pid: Pid,
        from: u8,
        to: u8,
    },
    // Ready channel overflow on requeue
    ProcessDropped {
        pid: Pid,
        reason: KernelError,
    },
    FileOp {
        index: usize,
        pid: Pid,
        kind: FileOpKind,
        name: String,
        result: Result<(), KernelError>,
    },
    DiskMap(DiskMap),
}

impl fmt::Display for KernelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelEvent::Admitted {
                pid,
                offset,
                blocks,
                tier,
                cpu,
                demand,
            } => {
                writeln!(f, "dispatcher =>")?;
                writeln!(f, "    PID: {pid}")?;
                writeln!(f, "    offset: {offset}")?;
                writeln!(f, "    blocks: {blocks}")?;
                writeln!(f, "    priority: {}", tier.raw())?;
                writeln!(f, "    time: {cpu}")?;
                writeln!(f, "    printers: {}", demand.printer.unwrap_or(0))?;
                writeln!(f, "    scanners: {}", u8::from(demand.scanner))?;
                writeln!(f, "    modems: {}", u8::from(demand.modem))?;
                write!(f, "    drives: {}", demand.port.unwrap_or(0))
            }
            KernelEvent::AdmissionRejected { seq, reason } => {
                write!(f, "dispatcher => record {seq} rejected: {reason}")
            }
            KernelEvent::SliceRan {
                pid,
                priority,
                first_instruction,
                ticks,
                remaining,
            } => {
                match priority {
                    Some(p) => writeln!(f, "process {pid} (priority {p}) =>")?,
                    None => writeln!(f, "process {pid} (real-time) =>")?,
                }
                for n in *first_instruction..first_instruction + ticks {
                    writeln!(f, "P{pid} instruction {n}")?;
                }
                write!(f, "P{pid} {remaining} ticks left")
            }
            KernelEvent::Completed { pid, at } => write!(f, "P{pid} return SIGINT (t={at})"),
            KernelEvent::Demoted { pid, from, to } => {
                write!(f, "P{pid} demoted {from} -> {to}")
            }
            KernelEvent::Promoted { pid, from, to } => {
                write!(f, "P{pid} promoted {from} -> {to}")
            }
            KernelEvent::ProcessDropped { pid, reason } => {
                write!(f, "P{pid} dropped: {reason}")
            }
            KernelEvent::FileOp {
                index,
                pid,
                kind,
                name,
                result,
            } => {
                let (verb, done) = match kind {
                    FileOpKind::Create { .. } => ("create", "created"),
                    FileOpKind::Delete => ("delete", "deleted"),
                };
                match result {
                    Ok(()) => write!(
                        f,
                        "Operation {index} => Success\nProcess {pid} {done} file {name}."
                    ),
                    Err(err) => write!(
                        f,
                        "Operation {index} => Failure\nProcess {pid} could not {verb} file {name}: {err}."
                    ),
                }
            }
            KernelEvent::DiskMap(map) => write!(f, "Disk occupancy map:\n{map}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_lists_each_instruction() {
        let event = KernelEvent::SliceRan {
            pid: 2,
            priority: Some(1),
            first_instruction: 4,
            ticks: 2,
            remaining: 1,
        };
        assert_eq!(
            event.to_string(),
            "process 2 (priority 1) =>\nP2 instruction 4\nP2 instruction 5\nP2 1 ticks left"
        );
    }

    #[test]
    fn test_file_op_failure_line() {
        let event = KernelEvent::FileOp {
            index: 3,
            pid: 9,
            kind: FileOpKind::Delete,
            name: "X".into(),
            result: Err(KernelError::UnknownPid(9)),
        };
        assert!(event.to_string().starts_with("Operation 3 => Failure"));
    }
}
