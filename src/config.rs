use std::path::PathBuf;

use crate::limits::DEFAULT_COMPACT_THRESHOLD;

/// Service configuration, read from `SLOTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Directory holding the WAL. Created if absent.
    pub data_dir: PathBuf,
    /// WAL appends between automatic compactions.
    pub compact_threshold: u64,
    /// Prometheus exporter port; metrics disabled when unset.
    pub metrics_port: Option<u16>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            metrics_port: None,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("SLOTBOOK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let compact_threshold = std::env::var("SLOTBOOK_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        let metrics_port = std::env::var("SLOTBOOK_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok());
        Self {
            data_dir,
            compact_threshold,
            metrics_port,
        }
    }
}
