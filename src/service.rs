use std::io;
use std::sync::Arc;

use tracing::info;

use crate::config::SchedulerConfig;
use crate::engine::Engine;
use crate::notify::NotifyHub;
use crate::{observability, reaper};

/// A ready scheduling service: the replayed engine plus its background
/// maintenance tasks. Construct inside a tokio runtime.
pub struct Scheduler {
    engine: Arc<Engine>,
}

impl Scheduler {
    pub fn open(config: &SchedulerConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.data_dir.join("slotbook.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify)?);

        observability::init(config.metrics_port);

        tokio::spawn(reaper::run_reaper(engine.clone()));
        tokio::spawn(reaper::run_compactor(engine.clone(), config.compact_threshold));

        info!("slotbook ledger open");
        info!("  data_dir: {}", config.data_dir.display());
        info!("  compact_threshold: {}", config.compact_threshold);
        info!(
            "  metrics: {}",
            config
                .metrics_port
                .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
        );
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotbook_test_service").join(name);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn open_creates_data_dir_and_serves() {
        let dir = test_data_dir("open");
        let config = SchedulerConfig {
            data_dir: dir.clone(),
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::open(&config).unwrap();

        let instructor = Ulid::new();
        scheduler.engine().create_calendar(instructor).await.unwrap();
        assert!(dir.join("slotbook.wal").exists());
    }

    #[tokio::test]
    async fn reopen_replays_ledger() {
        let dir = test_data_dir("reopen");
        let config = SchedulerConfig {
            data_dir: dir,
            ..SchedulerConfig::default()
        };
        let instructor = Ulid::new();
        {
            let scheduler = Scheduler::open(&config).unwrap();
            scheduler.engine().create_calendar(instructor).await.unwrap();
        }

        let scheduler = Scheduler::open(&config).unwrap();
        assert!(scheduler.engine().calendar(&instructor).is_some());
    }
}
