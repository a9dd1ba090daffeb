// src/store.rs
//! In-memory record store behind a cloneable, thread-safe handle.
//!
//! Holds the four persisted record sets (sources, items, buckets,
//! anomalies) and exposes exactly the store/query capabilities the
//! pipeline needs. The handle is an `Arc` and is cloned into each
//! concurrent ingestion task; a database-backed implementation could sit
//! behind the same methods.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::model::{AnomalyRecord, Bucket, BucketKey, Item, Source};
use crate::timeutil::Granularity;

/// Result of an item insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New row, with the assigned id.
    Inserted(i64),
    /// Canonical URL already present; nothing written.
    Duplicate,
}

#[derive(Default)]
struct StoreInner {
    sources: Vec<Source>,
    items: Vec<Item>,
    item_urls: HashSet<String>,
    next_item_id: i64,
    buckets: HashMap<BucketKey, u64>,
    anomalies: Vec<AnomalyRecord>,
    next_anomaly_id: i64,
}

#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- sources ----

    /// One-time seed: loads the given sources only when none are stored.
    /// Returns how many were loaded.
    pub fn seed_sources_if_empty(&self, sources: Vec<Source>) -> usize {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if !inner.sources.is_empty() {
            return 0;
        }
        let n = sources.len();
        inner.sources = sources;
        n
    }

    pub fn enabled_sources(&self) -> Vec<Source> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .sources
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    pub fn source_count(&self) -> usize {
        self.inner.read().expect("store lock poisoned").sources.len()
    }

    // ---- items ----

    /// Insert with "ignore if duplicate by canonical URL" semantics.
    /// Duplicate is an expected outcome, not an error; the `Result` exists
    /// for persistence failures a real backend could produce.
    pub fn insert_item(&self, mut item: Item) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        if inner.item_urls.contains(&item.url) {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.next_item_id += 1;
        item.id = inner.next_item_id;
        let id = item.id;
        inner.item_urls.insert(item.url.clone());
        inner.items.push(item);
        Ok(InsertOutcome::Inserted(id))
    }

    /// Items with `published_at >= since`, in insertion order.
    pub fn items_published_since(&self, since: DateTime<Utc>) -> Vec<Item> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .items
            .iter()
            .filter(|it| it.published_at >= since)
            .cloned()
            .collect()
    }

    /// Most recently fetched items, newest first.
    pub fn recent_items(&self, limit: usize) -> Vec<Item> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut items: Vec<Item> = inner.items.clone();
        items.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then(b.id.cmp(&a.id)));
        items.truncate(limit);
        items
    }

    pub fn item_count(&self) -> usize {
        self.inner.read().expect("store lock poisoned").items.len()
    }

    pub fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.items.iter().map(|it| it.fetched_at).max()
    }

    // ---- buckets ----

    /// Total replace of a bucket's count (idempotent upsert).
    pub fn upsert_bucket(&self, key: BucketKey, count: u64) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.buckets.insert(key, count);
        Ok(())
    }

    pub fn bucket_count(&self, key: &BucketKey) -> Option<u64> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.buckets.get(key).copied()
    }

    /// Sum of all per-source counts at `(bucket_start, granularity, topic)`.
    pub fn per_source_total(
        &self,
        bucket_start: DateTime<Utc>,
        granularity: Granularity,
        topic: &str,
    ) -> u64 {
        let inner = self.inner.read().expect("store lock poisoned");
        inner
            .buckets
            .iter()
            .filter(|(k, _)| {
                k.source.is_some()
                    && k.bucket_start == bucket_start
                    && k.granularity == granularity
                    && k.topic == topic
            })
            .map(|(_, c)| *c)
            .sum()
    }

    /// Topics that have rollup buckets at this granularity.
    pub fn topics_with_rollups(&self, granularity: Granularity) -> Vec<String> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut topics: Vec<String> = inner
            .buckets
            .keys()
            .filter(|k| k.source.is_none() && k.granularity == granularity)
            .map(|k| k.topic.clone())
            .collect();
        topics.sort();
        topics.dedup();
        topics
    }

    /// Rollup buckets for a topic with `start ∈ [from, until)`, ordered by
    /// bucket start ascending.
    pub fn rollup_series(
        &self,
        granularity: Granularity,
        topic: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<Bucket> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut series: Vec<Bucket> = inner
            .buckets
            .iter()
            .filter(|(k, _)| {
                k.source.is_none()
                    && k.granularity == granularity
                    && k.topic == topic
                    && k.bucket_start >= from
                    && k.bucket_start < until
            })
            .map(|(k, c)| Bucket {
                bucket_start: k.bucket_start,
                granularity: k.granularity,
                topic: k.topic.clone(),
                source: k.source.clone(),
                count: *c,
            })
            .collect();
        series.sort_by_key(|b| b.bucket_start);
        series
    }

    // ---- anomalies ----

    pub fn anomaly_exists(
        &self,
        bucket_start: DateTime<Utc>,
        granularity: Granularity,
        topic: &str,
    ) -> bool {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.anomalies.iter().any(|a| {
            a.bucket_start == bucket_start && a.granularity == granularity && a.topic == topic
        })
    }

    /// Insert unless a record already exists for the same
    /// `(bucket_start, granularity, topic)`. Returns the stored record, or
    /// `None` when it was already flagged.
    pub fn insert_anomaly(&self, mut anomaly: AnomalyRecord) -> Result<Option<AnomalyRecord>> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let exists = inner.anomalies.iter().any(|a| {
            a.bucket_start == anomaly.bucket_start
                && a.granularity == anomaly.granularity
                && a.topic == anomaly.topic
        });
        if exists {
            return Ok(None);
        }
        inner.next_anomaly_id += 1;
        anomaly.id = inner.next_anomaly_id;
        inner.anomalies.push(anomaly.clone());
        Ok(Some(anomaly))
    }

    /// Most recently detected anomalies, newest first.
    pub fn recent_anomalies(&self, limit: usize) -> Vec<AnomalyRecord> {
        let inner = self.inner.read().expect("store lock poisoned");
        let mut out: Vec<AnomalyRecord> = inner.anomalies.clone();
        out.sort_by(|a, b| b.detected_at.cmp(&a.detected_at).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        out
    }

    pub fn anomaly_count(&self) -> usize {
        self.inner.read().expect("store lock poisoned").anomalies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use chrono::TimeZone;

    fn item(url: &str) -> Item {
        Item {
            id: 0,
            source: "test".into(),
            kind: SourceKind::Rss,
            title: "t".into(),
            url: url.into(),
            summary: None,
            topic: "politics".into(),
            published_at: Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap(),
            fetched_at: Utc.with_ymd_and_hms(2024, 3, 14, 12, 1, 0).unwrap(),
            author: None,
            score: None,
            raw: None,
        }
    }

    #[test]
    fn duplicate_url_is_a_noop() {
        let store = Store::new();
        let first = store.insert_item(item("https://ex.com/a")).unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(1)));
        let second = store.insert_item(item("https://ex.com/a")).unwrap();
        assert_eq!(second, InsertOutcome::Duplicate);
        assert_eq!(store.item_count(), 1);
    }

    #[test]
    fn seed_only_when_empty() {
        let store = Store::new();
        let src = Source {
            name: "a".into(),
            kind: SourceKind::Rss,
            url_or_id: "https://ex.com/rss".into(),
            topic: None,
            enabled: true,
        };
        assert_eq!(store.seed_sources_if_empty(vec![src.clone()]), 1);
        assert_eq!(store.seed_sources_if_empty(vec![src.clone(), src]), 0);
        assert_eq!(store.source_count(), 1);
    }

    #[test]
    fn upsert_replaces_count() {
        let store = Store::new();
        let key = BucketKey {
            bucket_start: Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap(),
            granularity: Granularity::parse("5m").unwrap(),
            topic: "politics".into(),
            source: Some("test".into()),
        };
        store.upsert_bucket(key.clone(), 3).unwrap();
        store.upsert_bucket(key.clone(), 7).unwrap();
        assert_eq!(store.bucket_count(&key), Some(7));
    }

    #[test]
    fn anomaly_insert_is_idempotent() {
        let store = Store::new();
        let record = AnomalyRecord {
            id: 0,
            bucket_start: Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap(),
            granularity: Granularity::parse("5m").unwrap(),
            topic: "politics".into(),
            observed: 150,
            expected: 20.0,
            deviation: 65.0,
            method: crate::model::DetectionMethod::Mad,
            detected_at: Utc.with_ymd_and_hms(2024, 3, 14, 12, 5, 0).unwrap(),
        };
        assert!(store.insert_anomaly(record.clone()).unwrap().is_some());
        assert!(store.insert_anomaly(record).unwrap().is_none());
        assert_eq!(store.anomaly_count(), 1);
    }
}
