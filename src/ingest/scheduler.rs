// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::ingest::pipeline::IngestPipeline;

/// Spawn the periodic cycle runner. Ticks every `interval_secs`; a tick
/// that lands while a cycle is still in flight is skipped (the pipeline's
/// cycle guard serializes cycles, overlap never happens).
pub fn spawn_cycle_scheduler(pipeline: Arc<IngestPipeline>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(stats) = pipeline.try_run_cycle().await {
                tracing::debug!(
                    total_new = stats.total_new,
                    anomalies = stats.anomalies_detected,
                    "scheduled ingest tick"
                );
            }
        }
    })
}
