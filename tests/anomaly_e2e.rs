// tests/anomaly_e2e.rs
//
// The full detection scenario: a day of steady hourly traffic for one
// topic, then a sudden 150-item bucket. Exactly that bucket must be
// flagged, with the MAD method and the observed count intact.

use chrono::{DateTime, TimeZone, Utc};
use pulsewatch::analytics::anomaly::detect_anomalies_at;
use pulsewatch::analytics::bucket::aggregate_counts;
use pulsewatch::model::{DetectionMethod, Item, SourceKind};
use pulsewatch::store::Store;
use pulsewatch::timeutil::Granularity;

fn item(url: &str, topic: &str, source: &str, published_at: DateTime<Utc>) -> Item {
    Item {
        id: 0,
        source: source.into(),
        kind: SourceKind::Rss,
        title: "story".into(),
        url: url.into(),
        summary: None,
        topic: topic.into(),
        published_at,
        fetched_at: published_at,
        author: None,
        score: None,
        raw: None,
    }
}

#[test]
fn spike_bucket_is_flagged_exactly_once_with_mad() {
    let store = Store::new();
    let g = Granularity::parse("1h").unwrap();
    let day_start = Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap();

    // 24 baseline buckets around 20 items/hour, with mild variance so the
    // MAD stays comfortably above the z-score fallback cutoff.
    for hour in 0..24 {
        let bucket = day_start + chrono::Duration::hours(hour);
        let count = match hour % 4 {
            0 => 19,
            1 => 20,
            2 => 21,
            _ => 20,
        };
        for i in 0..count {
            store
                .insert_item(item(
                    &format!("https://ex.com/{hour}/{i}"),
                    "environment",
                    if i % 2 == 0 { "feed-a" } else { "feed-b" },
                    bucket + chrono::Duration::minutes(i * 2),
                ))
                .unwrap();
        }
    }

    // The injected spike: 150 items in hour 24.
    let spike_bucket = day_start + chrono::Duration::hours(24);
    for i in 0..150 {
        store
            .insert_item(item(
                &format!("https://ex.com/spike/{i}"),
                "environment",
                "feed-a",
                spike_bucket + chrono::Duration::seconds(i as i64 * 20),
            ))
            .unwrap();
    }

    aggregate_counts(&store, g, Some(day_start)).unwrap();

    let now = spike_bucket + chrono::Duration::hours(1);
    let found = detect_anomalies_at(&store, g, None, 288, 4.0, now).unwrap();

    assert_eq!(found.len(), 1, "exactly the spike bucket is flagged");
    let anomaly = &found[0];
    assert_eq!(anomaly.topic, "environment");
    assert_eq!(anomaly.bucket_start, spike_bucket);
    assert_eq!(anomaly.observed, 150);
    assert_eq!(anomaly.method, DetectionMethod::Mad);
    assert!(anomaly.deviation >= 4.0);
    assert!(anomaly.expected >= 19.0 && anomaly.expected <= 21.0);

    // Re-running detection over the same window is a no-op.
    let again = detect_anomalies_at(&store, g, None, 288, 4.0, now).unwrap();
    assert!(again.is_empty());
    assert_eq!(store.anomaly_count(), 1);
}

#[test]
fn quiet_traffic_raises_nothing() {
    let store = Store::new();
    let g = Granularity::parse("1h").unwrap();
    let day_start = Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap();

    for hour in 0..12 {
        let bucket = day_start + chrono::Duration::hours(hour);
        let count = 10 + (hour % 3);
        for i in 0..count {
            store
                .insert_item(item(
                    &format!("https://ex.com/q/{hour}/{i}"),
                    "politics",
                    "feed-a",
                    bucket + chrono::Duration::minutes(i * 4),
                ))
                .unwrap();
        }
    }
    aggregate_counts(&store, g, Some(day_start)).unwrap();

    let now = day_start + chrono::Duration::hours(12);
    let found = detect_anomalies_at(&store, g, None, 288, 4.0, now).unwrap();
    assert!(found.is_empty());
}

#[test]
fn short_history_is_skipped_silently() {
    let store = Store::new();
    let g = Granularity::parse("1h").unwrap();
    let day_start = Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap();

    // Only 5 buckets of history, one of them a huge spike: still skipped.
    for hour in 0..5 {
        let bucket = day_start + chrono::Duration::hours(hour);
        let count = if hour == 4 { 200 } else { 10 };
        for i in 0..count {
            store
                .insert_item(item(
                    &format!("https://ex.com/s/{hour}/{i}"),
                    "humanity",
                    "feed-a",
                    bucket + chrono::Duration::seconds(i * 15),
                ))
                .unwrap();
        }
    }
    aggregate_counts(&store, g, Some(day_start)).unwrap();

    let now = day_start + chrono::Duration::hours(5);
    let found = detect_anomalies_at(&store, g, None, 288, 4.0, now).unwrap();
    assert!(found.is_empty(), "fewer than 10 points must be skipped");
    assert_eq!(store.anomaly_count(), 0);
}
