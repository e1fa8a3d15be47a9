use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::Engine;
use crate::model::Ms;

/// Background task that purges canceled reservations past the retention
/// window. Canceled records are kept for audit until then.
pub async fn run_purger(engine: Arc<Engine>, retention_ms: Ms) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as Ms;
        let cutoff = now - retention_ms;
        match engine.purge_canceled(cutoff).await {
            Ok(0) => {}
            Ok(n) => info!("purged {n} canceled reservations past retention"),
            Err(e) => debug!("purge pass failed: {e}"),
        }
    }
}

/// Background task that compacts the WAL once the number of appends since
/// the last compaction crosses the threshold.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
