//! Kernel model configuration
//!
//! Sizes of the pools and queues plus the scheduling constants. Every field
//! has a default, so a JSON file only needs the keys it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::Ticks;
use crate::{KernelError, KernelResult};

/// Number of user priority levels (1 = best, 5 = worst)
pub const USER_LEVELS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Total memory blocks
    pub memory_blocks: usize,

    /// Leading memory blocks reserved for real-time processes
    pub rt_blocks: usize,

    /// Capacity of each ready channel
    pub queue_capacity: usize,

    /// Quantum per user priority, index 0 is priority 1
    pub user_quanta: [Ticks; USER_LEVELS],

    /// Accumulated waiting ticks that earn a user process one promotion
    pub aging_threshold: Ticks,

    /// Stop admitting after this many processes
    pub max_processes: Option<usize>,

    /// Sleep between admission passes while records are pending
    pub admission_backoff_ms: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            memory_blocks: 1024,
            rt_blocks: 64,
            queue_capacity: 100,
            user_quanta: [6, 5, 4, 3, 2],
            aging_threshold: 6,
            max_processes: None,
            admission_backoff_ms: 1,
        }
    }
}

impl KernelConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> KernelResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KernelError::InvalidConfiguration(e.to_string()))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| KernelError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> KernelResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| KernelError::InvalidConfiguration(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| KernelError::InvalidConfiguration(e.to_string()))
    }

    pub fn validate(&self) -> KernelResult<()> {
        if self.rt_blocks == 0 || self.rt_blocks >= self.memory_blocks {
            return Err(KernelError::InvalidConfiguration(format!(
                "rt_blocks must be in 1..{}, got {}",
                self.memory_blocks, self.rt_blocks
            )));
        }
        if self.queue_capacity == 0 {
            return Err(KernelError::InvalidConfiguration(
                "queue_capacity must be positive".into(),
            ));
        }
        if self.user_quanta.iter().any(|&q| q == 0) {
            return Err(KernelError::InvalidConfiguration(
                "every user quantum must be positive".into(),
            ));
        }
        if self.aging_threshold == 0 {
            return Err(KernelError::InvalidConfiguration(
                "aging_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.user_quanta, [6, 5, 4, 3, 2]);
    }

    #[test]
    fn test_config_save_load() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("kernel.json");

        let config = KernelConfig {
            memory_blocks: 10,
            rt_blocks: 2,
            max_processes: Some(3),
            ..KernelConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = KernelConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("kernel.json");
        std::fs::write(&path, r#"{ "queue_capacity": 4 }"#).unwrap();

        let loaded = KernelConfig::load(&path).unwrap();
        assert_eq!(loaded.queue_capacity, 4);
        assert_eq!(loaded.memory_blocks, 1024);
    }

    #[test]
    fn test_rejects_zone_larger_than_pool() {
        let config = KernelConfig {
            memory_blocks: 8,
            rt_blocks: 8,
            ..KernelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KernelError::InvalidConfiguration(_))
        ));
    }
}
