// src/analytics/bucket.rs
//! Time-bucket aggregation.
//!
//! Items are grouped by `(bucket_start, topic, source)` and each group's
//! count *replaces* the stored bucket count, so re-running aggregation
//! over the same window after a partial failure converges to the same
//! state. A second pass rewrites the rollup (source-less) bucket for every
//! touched `(bucket_start, topic)` as the sum of the per-source counts
//! currently in the store at that key.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use crate::model::BucketKey;
use crate::store::Store;
use crate::timeutil::{bucket_floor, now_utc, Granularity};

/// Aggregate item counts into buckets of the given width.
///
/// `since` bounds the window by `published_at`; when `None` it defaults to
/// one hour before now. Returns the number of per-source buckets written.
pub fn aggregate_counts(
    store: &Store,
    granularity: Granularity,
    since: Option<DateTime<Utc>>,
) -> Result<usize> {
    let since = since.unwrap_or_else(|| now_utc() - Duration::hours(1));

    let items = store.items_published_since(since);
    if items.is_empty() {
        return Ok(0);
    }

    // Pass 1: per-source counts.
    let mut groups: HashMap<(DateTime<Utc>, String, String), u64> = HashMap::new();
    for item in &items {
        let start = bucket_floor(item.published_at, granularity);
        *groups
            .entry((start, item.topic.clone(), item.source.clone()))
            .or_insert(0) += 1;
    }

    let written = groups.len();
    let mut touched: Vec<(DateTime<Utc>, String)> = Vec::new();
    for ((start, topic, source), count) in groups {
        store.upsert_bucket(
            BucketKey {
                bucket_start: start,
                granularity,
                topic: topic.clone(),
                source: Some(source),
            },
            count,
        )?;
        if !touched.contains(&(start, topic.clone())) {
            touched.push((start, topic));
        }
    }

    // Pass 2: rollups from the stored per-source counts, keeping the
    // rollup == sum(per-source) invariant exact even when this window only
    // touched a subset of sources.
    for (start, topic) in touched {
        let total = store.per_source_total(start, granularity, &topic);
        store.upsert_bucket(
            BucketKey {
                bucket_start: start,
                granularity,
                topic,
                source: None,
            },
            total,
        )?;
    }

    Ok(written)
}
