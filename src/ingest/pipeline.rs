// src/ingest/pipeline.rs
//! Ingestion cycle orchestration.
//!
//! One cycle: fetch every enabled source (RSS fan-out, Reddit serial),
//! persist with insert-ignore-duplicate semantics, aggregate the smallest
//! configured granularity, run anomaly detection, publish events. A single
//! source's failure never prevents the remaining sources or the downstream
//! stages from running.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::sync::{Arc, RwLock};
use tokio::task::JoinSet;

use crate::analytics::anomaly::detect_anomalies;
use crate::analytics::bucket::aggregate_counts;
use crate::config::Settings;
use crate::events::{EventBus, StreamEvent};
use crate::ingest::types::SourceFetcher;
use crate::model::{CycleStats, Item, Source, SourceKind};
use crate::store::{InsertOutcome, Store};

/// How many freshly accepted items are previewed on the event stream.
const ITEM_EVENT_PREVIEW: usize = 10;

/// Per-source fetch result fed back into the cycle stats.
struct SourceOutcome {
    kind: SourceKind,
    new_items: usize,
    error: Option<String>,
}

pub struct IngestPipeline {
    store: Store,
    bus: EventBus,
    rss: Arc<dyn SourceFetcher>,
    reddit: Arc<dyn SourceFetcher>,
    settings: Settings,
    /// Serializes cycles: the scheduler skips a tick while this is held,
    /// the manual trigger waits for it.
    cycle_guard: tokio::sync::Mutex<()>,
    last_cycle_utc: RwLock<Option<DateTime<Utc>>>,
}

impl IngestPipeline {
    pub fn new(
        store: Store,
        bus: EventBus,
        rss: Arc<dyn SourceFetcher>,
        reddit: Arc<dyn SourceFetcher>,
        settings: Settings,
    ) -> Self {
        crate::ingest::ensure_metrics_described();
        Self {
            store,
            bus,
            rss,
            reddit,
            settings,
            cycle_guard: tokio::sync::Mutex::new(()),
            last_cycle_utc: RwLock::new(None),
        }
    }

    pub fn last_cycle_utc(&self) -> Option<DateTime<Utc>> {
        *self.last_cycle_utc.read().expect("last-cycle lock poisoned")
    }

    /// Run one cycle, waiting for any in-flight cycle to finish first.
    pub async fn run_cycle(&self) -> CycleStats {
        let _guard = self.cycle_guard.lock().await;
        self.run_cycle_locked().await
    }

    /// Scheduler entrypoint: run one cycle unless one is already running.
    /// Returns `None` when the tick was skipped.
    pub async fn try_run_cycle(&self) -> Option<CycleStats> {
        match self.cycle_guard.try_lock() {
            Ok(_guard) => Some(self.run_cycle_locked().await),
            Err(_) => {
                counter!("ingest_cycles_skipped_total").increment(1);
                tracing::warn!("previous ingestion cycle still running, skipping tick");
                None
            }
        }
    }

    async fn run_cycle_locked(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        let sources = self.store.enabled_sources();
        if sources.is_empty() {
            tracing::warn!("no enabled sources configured, skipping cycle");
            return stats;
        }

        let (rss_sources, reddit_sources): (Vec<Source>, Vec<Source>) = sources
            .into_iter()
            .partition(|s| s.kind == SourceKind::Rss);

        // RSS: one task per source, unordered fan-out, join all. A store
        // handle is cloned into each task; item order within one feed is
        // preserved because each task inserts its own items in sequence.
        let mut join_set = JoinSet::new();
        for source in rss_sources {
            let fetcher = Arc::clone(&self.rss);
            let store = self.store.clone();
            join_set.spawn(async move { ingest_one_source(&*fetcher, &store, &source).await });
        }
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => apply_outcome(&mut stats, outcome),
                Err(e) => {
                    // A panicked fetch task only loses that source's items.
                    tracing::error!(error = ?e, "rss ingestion task failed");
                    stats.errors.push(format!("rss task: {e}"));
                }
            }
        }

        // Reddit: strictly sequential to respect platform rate limits.
        for source in reddit_sources {
            let outcome = ingest_one_source(&*self.reddit, &self.store, &source).await;
            apply_outcome(&mut stats, outcome);
        }

        // Aggregate, then detect; each stage failure is recorded without
        // stopping the rest of the cycle.
        match aggregate_counts(&self.store, self.settings.granularity, None) {
            Ok(written) => {
                tracing::info!(buckets = written, granularity = %self.settings.granularity, "aggregated counts");
            }
            Err(e) => {
                tracing::error!(error = ?e, "aggregation failed");
                stats.errors.push(format!("aggregation: {e}"));
            }
        }

        let mut new_anomalies = Vec::new();
        match detect_anomalies(
            &self.store,
            self.settings.granularity,
            None,
            self.settings.anomaly_window_buckets,
            self.settings.anomaly_threshold,
        ) {
            Ok(found) => {
                stats.anomalies_detected = found.len();
                counter!("anomalies_detected_total").increment(found.len() as u64);
                new_anomalies = found;
            }
            Err(e) => {
                tracing::error!(error = ?e, "anomaly detection failed");
                stats.errors.push(format!("anomaly_detection: {e}"));
            }
        }

        for anomaly in &new_anomalies {
            self.bus.publish(StreamEvent::Anomaly(anomaly.into()));
        }
        if stats.total_new > 0 {
            let preview = self
                .store
                .recent_items(ITEM_EVENT_PREVIEW.min(stats.total_new));
            for item in &preview {
                self.bus.publish(StreamEvent::Item(item.into()));
            }
        }

        let now = Utc::now();
        *self.last_cycle_utc.write().expect("last-cycle lock poisoned") = Some(now);
        counter!("ingest_cycles_total").increment(1);
        gauge!("ingest_last_cycle_ts").set(now.timestamp() as f64);

        tracing::info!(
            rss = stats.rss_count,
            reddit = stats.reddit_count,
            total_new = stats.total_new,
            anomalies = stats.anomalies_detected,
            errors = stats.errors.len(),
            "ingestion cycle complete"
        );
        stats
    }
}

/// Fetch one source and persist its items. Fetch failure yields zero items
/// and an error entry; a duplicate insert is silently absorbed; any other
/// persistence failure drops that single item and continues.
async fn ingest_one_source(
    fetcher: &dyn SourceFetcher,
    store: &Store,
    source: &Source,
) -> SourceOutcome {
    let mut outcome = SourceOutcome {
        kind: source.kind,
        new_items: 0,
        error: None,
    };

    let items: Vec<Item> = match fetcher.fetch(source).await {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = ?e, source = %source.name, "source fetch failed");
            counter!("ingest_source_errors_total").increment(1);
            outcome.error = Some(format!("{}: {e:#}", source.name));
            return outcome;
        }
    };

    for item in items {
        match store.insert_item(item) {
            Ok(InsertOutcome::Inserted(_)) => {
                outcome.new_items += 1;
                counter!("ingest_new_total").increment(1);
            }
            Ok(InsertOutcome::Duplicate) => {
                counter!("ingest_duplicate_total").increment(1);
            }
            Err(e) => {
                tracing::error!(error = ?e, source = %source.name, "item insert failed");
                outcome
                    .error
                    .get_or_insert_with(|| format!("{}: {e:#}", source.name));
            }
        }
    }

    tracing::info!(
        source = %source.name,
        kind = source.kind.as_str(),
        new_items = outcome.new_items,
        "source ingested"
    );
    outcome
}

fn apply_outcome(stats: &mut CycleStats, outcome: SourceOutcome) {
    match outcome.kind {
        SourceKind::Rss => stats.rss_count += outcome.new_items,
        SourceKind::RedditSub | SourceKind::RedditUser => {
            stats.reddit_count += outcome.new_items
        }
    }
    stats.total_new += outcome.new_items;
    if let Some(err) = outcome.error {
        stats.errors.push(err);
    }
}
