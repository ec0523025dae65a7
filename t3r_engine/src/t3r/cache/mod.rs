// Time-indexed event cache: build once from a raw log, then answer
// bounded range queries from memory.

pub mod builder;
pub mod format;
pub mod reader;

use serde::{Deserialize, Serialize};

pub use builder::{BuildStats, CacheBuilder};
pub use format::{CacheIndex, MAGIC, VERSION};
pub use reader::{BoundKind, CacheReader};

/// Tuning knobs for [`CacheBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Desired number of events per interval, averaged over the whole log.
    pub target_interval_size: u64,
    /// Distance within which a timestamp still extends an existing segment
    /// during discovery.
    pub segment_margin: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            target_interval_size: 20_000,
            segment_margin: 10_000_000,
        }
    }
}
