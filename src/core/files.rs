use std::fmt;

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};

use super::memory::first_fit;
use super::state::Pid;
use crate::{KernelError, KernelResult};

/// Rendered for free blocks in the occupancy map; never a valid file name.
pub const FREE_MARKER: &str = "0";

new_key_type! {
    pub struct FileKey;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    // None for files present on disk before the run
    pub creator: Option<Pid>,
}

/// A file already on disk when the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingFile {
    pub name: String,
    pub offset: usize,
    pub size: usize,
    pub creator: Option<Pid>,
}

#[derive(Debug)]
pub struct FileSystem {
    blocks: Vec<Option<FileKey>>,
    files: SlotMap<FileKey, FileEntry>,
    by_name: FxHashMap<String, FileKey>,
}

impl FileSystem {
    pub fn new(total_blocks: usize) -> Self {
        Self {
            blocks: vec![None; total_blocks],
            files: SlotMap::with_key(),
            by_name: FxHashMap::default(),
        }
    }

    pub fn load_existing(&mut self, existing: &[ExistingFile]) -> KernelResult<()> {
        for file in existing {
            Self::check_name(&file.name)?;
            if self.by_name.contains_key(&file.name) {
                return Err(KernelError::FileExists(file.name.clone()));
            }
            let end = file.offset.checked_add(file.size);
            let fits = file.size > 0
                && end.is_some_and(|end| end <= self.blocks.len())
                && self.blocks[file.offset..file.offset + file.size]
                    .iter()
                    .all(Option::is_none);
            if !fits {
                return Err(KernelError::InvalidExtent {
                    name: file.name.clone(),
                    offset: file.offset,
                    size: file.size,
                });
            }
            self.insert(file.name.clone(), file.offset, file.size, file.creator);
        }
        Ok(())
    }

    /// First-fit over the whole disk. Returns the offset of the new file.
    pub fn create(
        &mut self,
        pid: Pid,
        name: &str,
        size: usize,
        _is_privileged: bool,
    ) -> KernelResult<usize> {
        Self::check_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(KernelError::FileExists(name.to_string()));
        }
        if size == 0 {
            return Err(KernelError::InvalidSize {
                size,
                capacity: self.blocks.len(),
            });
        }
        let offset = first_fit(&self.blocks, size).ok_or(KernelError::NoSpace { size })?;
        self.insert(name.to_string(), offset, size, Some(pid));
        Ok(offset)
    }

    /// Privileged callers may delete any file, others only their own.
    pub fn delete(&mut self, pid: Pid, name: &str, is_privileged: bool) -> KernelResult<()> {
        let key = *self
            .by_name
            .get(name)
            .ok_or_else(|| KernelError::FileNotFound(name.to_string()))?;

        let entry = &self.files[key];
        if !is_privileged && entry.creator != Some(pid) {
            return Err(KernelError::PermissionDenied {
                pid,
                name: name.to_string(),
            });
        }

        let (offset, size) = (entry.offset, entry.size);
        for block in &mut self.blocks[offset..offset + size] {
            *block = None;
        }
        self.files.remove(key);
        self.by_name.remove(name);
        Ok(())
    }

    pub fn occupancy_snapshot(&self) -> DiskMap {
        DiskMap(
            self.blocks
                .iter()
                .map(|block| block.map(|key| self.files[key].name.clone()))
                .collect(),
        )
    }

    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        self.by_name.get(name).map(|&key| &self.files[key])
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn insert(&mut self, name: String, offset: usize, size: usize, creator: Option<Pid>) {
        let key = self.files.insert(FileEntry {
            name: name.clone(),
            offset,
            size,
            creator,
        });
        for block in &mut self.blocks[offset..offset + size] {
            *block = Some(key);
        }
        self.by_name.insert(name, key);
    }

    fn check_name(name: &str) -> KernelResult<()> {
        if name.is_empty() || name == FREE_MARKER || name.chars().any(char::is_whitespace) {
            return Err(KernelError::InvalidFileName(name.to_string()));
        }
        Ok(())
    }
}

/// Owner of every disk block, in block order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskMap(pub Vec<Option<String>>);

impl DiskMap {
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .map(|block| block.as_deref().unwrap_or(FREE_MARKER))
    }
}

// Single-character names are packed like the classic disk map; longer names
// are space separated so blocks stay distinguishable.
impl fmt::Display for DiskMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let packed = self.tokens().all(|t| t.chars().count() == 1);
        let sep = if packed { "" } else { " " };
        for (i, token) in self.tokens().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            f.write_str(token)?;
        }
        Ok(())
    }
}
