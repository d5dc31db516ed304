use std::ops::Range;

use super::state::Pid;
use crate::{KernelError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    RealTime,
    User,
}

/// Start of the first run of `size` free slots, scanning left to right.
pub(crate) fn first_fit<T>(blocks: &[Option<T>], size: usize) -> Option<usize> {
    if size == 0 {
        return None;
    }
    let mut run = 0;
    for (i, block) in blocks.iter().enumerate() {
        if block.is_none() {
            run += 1;
            if run == size {
                return Some(i + 1 - size);
            }
        } else {
            run = 0;
        }
    }
    None
}

/// Working memory: a fixed block array whose leading blocks are reserved for
/// real-time processes.
#[derive(Debug)]
pub struct MemoryPool {
    blocks: Vec<Option<Pid>>,
    rt_blocks: usize,
}

impl MemoryPool {
    pub fn new(total_blocks: usize, rt_blocks: usize) -> Self {
        assert!(
            rt_blocks <= total_blocks,
            "Real-time zone ({rt_blocks}) larger than pool ({total_blocks})"
        );
        Self {
            blocks: vec![None; total_blocks],
            rt_blocks,
        }
    }

    pub fn zone_range(&self, zone: Zone) -> Range<usize> {
        match zone {
            Zone::RealTime => 0..self.rt_blocks,
            Zone::User => self.rt_blocks..self.blocks.len(),
        }
    }

    pub fn zone_capacity(&self, zone: Zone) -> usize {
        self.zone_range(zone).len()
    }

    pub fn free_blocks(&self, zone: Zone) -> usize {
        self.blocks[self.zone_range(zone)]
            .iter()
            .filter(|b| b.is_none())
            .count()
    }

    /// First-fit inside `zone`; the returned offset is absolute.
    pub fn allocate(&mut self, pid: Pid, size: usize, zone: Zone) -> KernelResult<usize> {
        let capacity = self.zone_capacity(zone);
        if size == 0 || size > capacity {
            return Err(KernelError::InvalidSize { size, capacity });
        }

        let range = self.zone_range(zone);
        let start = range.start;
        let offset = first_fit(&self.blocks[range], size)
            .map(|rel| start + rel)
            .ok_or(KernelError::NoSpace { size })?;

        for block in &mut self.blocks[offset..offset + size] {
            *block = Some(pid);
        }
        Ok(offset)
    }

    /// Clear every block owned by `pid`, in either zone. Returns blocks freed.
    pub fn free(&mut self, pid: Pid) -> usize {
        let mut freed = 0;
        for block in self.blocks.iter_mut().filter(|b| **b == Some(pid)) {
            *block = None;
            freed += 1;
        }
        freed
    }

    pub fn owner(&self, block: usize) -> Option<Pid> {
        self.blocks.get(block).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks_of(&self, pid: Pid) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == Some(pid))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_fit_skips_short_runs() {
        let blocks = [None, Some(1), None, None, Some(2), None, None, None];
        assert_eq!(first_fit(&blocks, 1), Some(0));
        assert_eq!(first_fit(&blocks, 2), Some(2));
        assert_eq!(first_fit(&blocks, 3), Some(5));
        assert_eq!(first_fit(&blocks, 4), None);
        assert_eq!(first_fit(&blocks, 0), None);
    }

    #[test]
    fn test_real_time_zone_is_isolated() {
        let mut pool = MemoryPool::new(10, 2);
        assert_eq!(pool.allocate(0, 2, Zone::RealTime), Ok(0));
        assert_eq!(
            pool.allocate(1, 1, Zone::RealTime),
            Err(KernelError::NoSpace { size: 1 })
        );
        assert_eq!(pool.free_blocks(Zone::User), 8);
        assert_eq!(pool.allocate(2, 8, Zone::User), Ok(2));
    }

    #[test]
    fn test_oversized_request_is_invalid() {
        let mut pool = MemoryPool::new(10, 2);
        assert_eq!(
            pool.allocate(0, 3, Zone::RealTime),
            Err(KernelError::InvalidSize {
                size: 3,
                capacity: 2
            })
        );
        assert!(matches!(
            pool.allocate(0, 0, Zone::User),
            Err(KernelError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_free_then_reallocate_reuses_run() {
        let mut pool = MemoryPool::new(16, 4);
        let a = pool.allocate(1, 3, Zone::User).unwrap();
        let b = pool.allocate(2, 5, Zone::User).unwrap();
        assert_eq!((a, b), (4, 7));

        assert_eq!(pool.free(1), 3);
        assert_eq!(pool.allocate(3, 3, Zone::User), Ok(a));
        assert_eq!(pool.free(99), 0);
    }

    #[test]
    fn test_free_ignores_zone() {
        let mut pool = MemoryPool::new(8, 4);
        pool.allocate(7, 4, Zone::RealTime).unwrap();
        assert_eq!(pool.free(7), 4);
        assert_eq!(pool.free_blocks(Zone::RealTime), 4);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every successful allocation is one contiguous run of exactly the
        /// requested size that stays inside its zone.
        #[test]
        fn allocations_are_contiguous_and_zoned(
            requests in prop::collection::vec((1usize..12, any::<bool>()), 1..24)
        ) {
            let mut pool = MemoryPool::new(64, 16);
            for (pid, (size, rt)) in requests.into_iter().enumerate() {
                let zone = if rt { Zone::RealTime } else { Zone::User };
                if let Ok(offset) = pool.allocate(pid, size, zone) {
                    let owned = pool.blocks_of(pid);
                    prop_assert_eq!(owned.len(), size);
                    prop_assert_eq!(owned[0], offset);
                    prop_assert!(owned.windows(2).all(|w| w[1] == w[0] + 1));
                    let range = pool.zone_range(zone);
                    prop_assert!(range.contains(&offset));
                    prop_assert!(range.contains(&(offset + size - 1)));
                }
            }
        }
    }
}
