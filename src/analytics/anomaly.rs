// src/analytics/anomaly.rs
//! Spike detection against a robust rolling baseline.
//!
//! The baseline for a topic is the median of its trailing rollup-bucket
//! counts; dispersion is the MAD (median absolute deviation). A
//! near-degenerate MAD (< 0.1) falls back to the population standard
//! deviation and marks the record `zscore`. The deviation score is always
//! the absolute distance in dispersion units.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{AnomalyRecord, DetectionMethod};
use crate::store::Store;
use crate::timeutil::{now_utc, Granularity};

/// Minimum historical points before a topic is scored at all.
pub const MIN_HISTORY: usize = 10;
/// Default trailing window: 24h of 5-minute buckets.
pub const DEFAULT_WINDOW_BUCKETS: u32 = 288;
/// Default deviation threshold.
pub const DEFAULT_THRESHOLD: f64 = 4.0;

/// Estimated baseline for a count series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub expected: f64,
    pub dispersion: f64,
    pub method: DetectionMethod,
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn population_stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

/// Estimate `(expected, dispersion)` for a series of bucket counts.
///
/// Empty series ⇒ `(0.0, 1.0)`; a single point ⇒ `(value, 1.0)`. Otherwise
/// median and MAD, with the stddev fallback when the MAD is below 0.1.
pub fn compute_baseline(series: &[u64]) -> Baseline {
    if series.is_empty() {
        return Baseline {
            expected: 0.0,
            dispersion: 1.0,
            method: DetectionMethod::Mad,
        };
    }
    if series.len() == 1 {
        return Baseline {
            expected: series[0] as f64,
            dispersion: 1.0,
            method: DetectionMethod::Mad,
        };
    }

    let mut values: Vec<f64> = series.iter().map(|v| *v as f64).collect();
    values.sort_by(|a, b| a.total_cmp(b));
    let med = median(&values);

    let mut deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    deviations.sort_by(|a, b| a.total_cmp(b));
    let mad = median(&deviations);

    if mad < 0.1 {
        Baseline {
            expected: med,
            dispersion: population_stddev(&values),
            method: DetectionMethod::Zscore,
        }
    } else {
        Baseline {
            expected: med,
            dispersion: mad,
            method: DetectionMethod::Mad,
        }
    }
}

/// Absolute deviation of `observed` from `expected`, in dispersion units.
/// A non-positive dispersion scores 0.0 (never divides by zero).
pub fn deviation_score(observed: u64, expected: f64, dispersion: f64) -> f64 {
    if dispersion <= 0.0 {
        return 0.0;
    }
    (observed as f64 - expected).abs() / dispersion
}

/// Scan rollup buckets and flag anomalous newest buckets.
///
/// For each topic (or just `topic` when given), pulls the trailing
/// `window_buckets` rollup series ending just before `now`, skips topics
/// with fewer than [`MIN_HISTORY`] points, and scores the newest bucket
/// against the window's baseline. Already-flagged buckets are skipped
/// silently, which makes overlapping detection cycles safe. Returns the
/// newly persisted records.
pub fn detect_anomalies(
    store: &Store,
    granularity: Granularity,
    topic: Option<&str>,
    window_buckets: u32,
    threshold: f64,
) -> Result<Vec<AnomalyRecord>> {
    let now = now_utc();
    detect_anomalies_at(store, granularity, topic, window_buckets, threshold, now)
}

/// [`detect_anomalies`] with an explicit "now", for deterministic tests.
pub fn detect_anomalies_at(
    store: &Store,
    granularity: Granularity,
    topic: Option<&str>,
    window_buckets: u32,
    threshold: f64,
    now: DateTime<Utc>,
) -> Result<Vec<AnomalyRecord>> {
    let window_start = now - granularity.as_duration() * window_buckets as i32;

    let topics: Vec<String> = match topic {
        Some(t) => vec![t.to_string()],
        None => store.topics_with_rollups(granularity),
    };

    let mut new_anomalies = Vec::new();
    for topic in topics {
        let series = store.rollup_series(granularity, &topic, window_start, now);
        if series.len() < MIN_HISTORY {
            // Insufficient baseline data is not an error.
            continue;
        }

        let counts: Vec<u64> = series.iter().map(|b| b.count).collect();
        let baseline = compute_baseline(&counts);

        let Some(latest) = series.last() else { continue };
        if store.anomaly_exists(latest.bucket_start, granularity, &topic) {
            continue;
        }

        let score = deviation_score(latest.count, baseline.expected, baseline.dispersion);
        if score < threshold {
            continue;
        }

        let record = AnomalyRecord {
            id: 0,
            bucket_start: latest.bucket_start,
            granularity,
            topic: topic.clone(),
            observed: latest.count,
            expected: baseline.expected,
            deviation: score,
            method: baseline.method,
            detected_at: now,
        };
        if let Some(stored) = store.insert_anomaly(record)? {
            tracing::info!(
                topic = %stored.topic,
                bucket_start = %stored.bucket_start,
                observed = stored.observed,
                expected = stored.expected,
                deviation = stored.deviation,
                method = stored.method.as_str(),
                "anomaly detected"
            );
            new_anomalies.push(stored);
        }
    }

    Ok(new_anomalies)
}
