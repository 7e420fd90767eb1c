//! Ingestion configuration.
//!
//! Constructed once at startup and passed by reference into the supervisor,
//! scheduler, and workers — there is no process-wide config singleton, so
//! parallel tests can each run with their own instance.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Height;

/// Configuration consumed by the ingestion core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// First height of the historical backfill.
    pub start_height: Height,
    /// Number of concurrent workers draining the height queue.
    pub workers: usize,
    /// Average block interval, used to pace the live-tail poll loop.
    pub avg_block_time_ms: u64,
    /// Enqueue height 0 (genesis state) at startup.
    pub parse_genesis: bool,
    /// Run the historical backfill from `start_height` to the launch tip.
    pub parse_old_blocks: bool,
    /// Follow the live tip.
    pub parse_new_blocks: bool,
    /// Skip the historical backfill entirely to reach the live tip faster.
    /// Historical gaps stay unfilled until a later run without this flag.
    pub fast_sync: bool,
    /// Local genesis file. When unset, the genesis document is fetched from
    /// the node instead.
    pub genesis_file_path: Option<PathBuf>,
}

impl IngestConfig {
    pub fn avg_block_time(&self) -> Duration {
        Duration::from_millis(self.avg_block_time_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            start_height: 1,
            workers: 1,
            avg_block_time_ms: 5000,
            parse_genesis: true,
            parse_old_blocks: true,
            parse_new_blocks: true,
            fast_sync: false,
            genesis_file_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.start_height, 1);
        assert_eq!(cfg.workers, 1);
        assert!(!cfg.fast_sync);
        assert_eq!(cfg.avg_block_time(), Duration::from_secs(5));
    }

    #[test]
    fn partial_yaml_like_json_fills_defaults() {
        let cfg: IngestConfig =
            serde_json::from_str(r#"{"workers": 4, "fast_sync": true}"#).unwrap();
        assert_eq!(cfg.workers, 4);
        assert!(cfg.fast_sync);
        assert_eq!(cfg.start_height, 1);
    }
}
