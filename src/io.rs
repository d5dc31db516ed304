//! Text input formats
//!
//! Process file: one record per non-empty line,
//! `arrival_delay, tier, cpu, blocks, printer, scanner, modem, port`.
//!
//! File-system file: total blocks, number of existing files, one
//! `name, offset, size[, creator]` line per existing file (creator defaults
//! to pid 0, `-` marks a system-owned file), then operations
//! `pid, op, name[, size]` where op 0 creates and 1 deletes.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::core::ExistingFile;
use crate::sim::{FileOp, FileOpKind, ProcessRecord};
use crate::{KernelError, KernelResult};

fn field<T: FromStr>(parts: &[&str], idx: usize, what: &str, line: usize) -> KernelResult<T> {
    let raw = parts.get(idx).ok_or_else(|| KernelError::Parse {
        line,
        reason: format!("missing {what}"),
    })?;
    raw.parse().map_err(|_| KernelError::Parse {
        line,
        reason: format!("invalid {what}: {raw:?}"),
    })
}

// 1-based line numbers of the non-empty lines
fn numbered_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
}

fn split(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

pub fn parse_processes(content: &str) -> KernelResult<Vec<ProcessRecord>> {
    numbered_lines(content)
        .map(|(n, line)| {
            let parts = split(line);
            if parts.len() != 8 {
                return Err(KernelError::Parse {
                    line: n,
                    reason: format!("expected 8 fields, found {}", parts.len()),
                });
            }
            Ok(ProcessRecord {
                arrival_delay: field(&parts, 0, "arrival time", n)?,
                tier: field(&parts, 1, "priority", n)?,
                total_cpu: field(&parts, 2, "cpu time", n)?,
                memory_size: field(&parts, 3, "memory blocks", n)?,
                printer: field(&parts, 4, "printer", n)?,
                scanner: field(&parts, 5, "scanner", n)?,
                modem: field(&parts, 6, "modem", n)?,
                port: field(&parts, 7, "port", n)?,
            })
        })
        .collect()
}

pub fn read_processes<P: AsRef<Path>>(path: P) -> KernelResult<Vec<ProcessRecord>> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_processes(&content)
}

/// Parsed file-system description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub total_blocks: usize,
    pub existing: Vec<ExistingFile>,
    pub ops: Vec<FileOp>,
}

impl DiskSpec {
    pub fn from_file<P: AsRef<Path>>(path: P) -> KernelResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> KernelResult<Self> {
        let mut lines = numbered_lines(content);

        let (n, line) = lines.next().ok_or(KernelError::Parse {
            line: 1,
            reason: "empty file-system description".into(),
        })?;
        let total_blocks = field(&[line], 0, "total blocks", n)?;

        let (n, line) = lines.next().ok_or(KernelError::Parse {
            line: n + 1,
            reason: "missing number of existing files".into(),
        })?;
        let count: usize = field(&[line], 0, "number of existing files", n)?;

        let mut existing = Vec::with_capacity(count);
        for _ in 0..count {
            let (n, line) = lines.next().ok_or(KernelError::Parse {
                line: n,
                reason: format!("expected {count} existing files"),
            })?;
            let parts = split(line);
            if !(3..=4).contains(&parts.len()) {
                return Err(KernelError::Parse {
                    line: n,
                    reason: format!("expected 3 or 4 fields, found {}", parts.len()),
                });
            }
            existing.push(ExistingFile {
                name: parts[0].to_string(),
                offset: field(&parts, 1, "offset", n)?,
                size: field(&parts, 2, "size", n)?,
                creator: match parts.get(3) {
                    Some(&"-") => None,
                    Some(_) => Some(field(&parts, 3, "creator", n)?),
                    None => Some(0),
                },
            });
        }

        let ops = lines
            .map(|(n, line)| Self::parse_op(n, line))
            .collect::<KernelResult<_>>()?;

        Ok(Self {
            total_blocks,
            existing,
            ops,
        })
    }

    fn parse_op(n: usize, line: &str) -> KernelResult<FileOp> {
        let parts = split(line);
        let pid = field(&parts, 0, "pid", n)?;
        let op: u32 = field(&parts, 1, "operation", n)?;
        let name = parts
            .get(2)
            .filter(|s| !s.is_empty())
            .ok_or(KernelError::Parse {
                line: n,
                reason: "missing file name".into(),
            })?
            .to_string();
        let kind = match op {
            0 => FileOpKind::Create {
                size: field(&parts, 3, "size", n)?,
            },
            1 => FileOpKind::Delete,
            other => {
                return Err(KernelError::Parse {
                    line: n,
                    reason: format!("unknown operation {other}"),
                })
            }
        };
        Ok(FileOp { pid, kind, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_processes() {
        let records = parse_processes("2, 0, 3, 64, 0, 0, 0, 0\n\n8, 1, 2, 64, 1, 0, 0, 2\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tier, 0);
        assert_eq!(records[1].printer, 1);
        assert_eq!(records[1].port, 2);
    }

    #[test]
    fn test_parse_processes_reports_line() {
        let err = parse_processes("0, 1, 2, 3, 0, 0, 0, 0\n\n0, 1, x, 3, 0, 0, 0, 0").unwrap_err();
        assert_eq!(
            err,
            KernelError::Parse {
                line: 3,
                reason: "invalid cpu time: \"x\"".into()
            }
        );
        assert!(matches!(
            parse_processes("1, 2, 3"),
            Err(KernelError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_parse_disk_spec() {
        let spec = DiskSpec::parse(
            "10\n3\nX, 0, 2\nY, 3, 1, -\nZ, 5, 3, 1\n0, 0, A, 5\n0, 1, X\n2, 0, B, 2\n1, 1, E\n",
        )
        .unwrap();
        assert_eq!(spec.total_blocks, 10);
        assert_eq!(spec.existing.len(), 3);
        assert_eq!(spec.existing[0].creator, Some(0));
        assert_eq!(spec.existing[1].creator, None);
        assert_eq!(spec.existing[2].creator, Some(1));
        assert_eq!(spec.ops.len(), 4);
        assert_eq!(spec.ops[0].kind, FileOpKind::Create { size: 5 });
        assert_eq!(spec.ops[1].kind, FileOpKind::Delete);
        assert_eq!(spec.ops[3].name, "E");
    }

    #[test]
    fn test_read_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let procs = dir.path().join("processes.txt");
        let disk = dir.path().join("files.txt");
        std::fs::write(&procs, "0, 1, 4, 16, 0, 1, 0, 0\n").unwrap();
        std::fs::write(&disk, "4\n1\nA, 1, 2\n0, 1, A\n").unwrap();

        let records = read_processes(&procs).unwrap();
        assert_eq!(records[0].scanner, 1);
        let spec = DiskSpec::from_file(&disk).unwrap();
        assert_eq!(spec.existing[0].offset, 1);
        assert_eq!(spec.ops[0].kind, FileOpKind::Delete);

        assert!(matches!(
            read_processes(dir.path().join("missing.txt")),
            Err(KernelError::Io(_))
        ));
    }

    #[test]
    fn test_create_without_size_is_rejected() {
        let err = DiskSpec::parse("4\n0\n0, 0, A\n").unwrap_err();
        assert!(matches!(err, KernelError::Parse { line: 3, .. }));
    }
}
