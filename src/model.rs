// src/model.rs
//! Core record types shared across the pipeline: sources, ingested items,
//! count buckets, and anomaly records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timeutil::Granularity;

/// Kind of external feed a source points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rss,
    RedditSub,
    RedditUser,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Rss => "rss",
            SourceKind::RedditSub => "reddit_sub",
            SourceKind::RedditUser => "reddit_user",
        }
    }
}

/// Source configuration record. Owned by configuration, read-only to the
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// Feed URL for RSS, subreddit or username for Reddit.
    pub url_or_id: String,
    /// Optional forced topic; wins over keyword classification.
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// One ingested item. `url` is the canonical (normalized) URL and the
/// global uniqueness key; a second ingestion of the same URL is a no-op.
/// Items are never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Assigned by the store on insert; 0 before that.
    #[serde(default)]
    pub id: i64,
    pub source: String,
    pub kind: SourceKind,
    pub title: String,
    pub url: String,
    pub summary: Option<String>,
    pub topic: String,
    pub published_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
    pub author: Option<String>,
    /// Platform popularity (Reddit score); RSS items carry none.
    pub score: Option<i64>,
    /// Opaque source-specific extras (feed categories, subreddit metadata).
    pub raw: Option<serde_json::Value>,
}

/// Composite key of a count bucket. `source == None` is the rollup
/// sentinel: the sum over all sources for the topic at this bucket start.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub bucket_start: DateTime<Utc>,
    pub granularity: Granularity,
    pub topic: String,
    pub source: Option<String>,
}

/// A materialized bucket row, as returned by store queries.
#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub granularity: Granularity,
    pub topic: String,
    pub source: Option<String>,
    pub count: u64,
}

/// Baseline estimator that produced an anomaly's deviation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Mad,
    Zscore,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Mad => "mad",
            DetectionMethod::Zscore => "zscore",
        }
    }
}

/// A flagged bucket. At most one record exists per
/// `(bucket_start, granularity, topic)`; repeated detection runs over the
/// same bucket are no-ops.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyRecord {
    pub id: i64,
    pub bucket_start: DateTime<Utc>,
    pub granularity: Granularity,
    pub topic: String,
    pub observed: u64,
    pub expected: f64,
    pub deviation: f64,
    pub method: DetectionMethod,
    pub detected_at: DateTime<Utc>,
}

/// Outcome of one ingestion cycle, returned by the orchestrator and
/// serialized by the manual-trigger endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleStats {
    pub rss_count: usize,
    pub reddit_count: usize,
    pub total_new: usize,
    pub anomalies_detected: usize,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_round_trips_snake_case() {
        let json = serde_json::to_string(&SourceKind::RedditSub).unwrap();
        assert_eq!(json, r#""reddit_sub""#);
        let back: SourceKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SourceKind::RedditSub);
    }

    #[test]
    fn source_config_defaults_enabled() {
        let src: Source = toml::from_str(
            r#"
name = "BBC World"
type = "rss"
url_or_id = "https://feeds.bbci.co.uk/news/world/rss.xml"
"#,
        )
        .unwrap();
        assert!(src.enabled);
        assert!(src.topic.is_none());
        assert_eq!(src.kind, SourceKind::Rss);
    }

    #[test]
    fn detection_method_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DetectionMethod::Zscore).unwrap(),
            r#""zscore""#
        );
    }
}
