// src/ingest/mod.rs
pub mod classify;
pub mod pipeline;
pub mod providers;
pub mod scheduler;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Raw items parsed from sources.");
        describe_counter!("ingest_new_total", "Items newly persisted.");
        describe_counter!(
            "ingest_duplicate_total",
            "Items absorbed as canonical-URL duplicates."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Source fetch/parse failures."
        );
        describe_counter!("ingest_cycles_total", "Completed ingestion cycles.");
        describe_counter!(
            "ingest_cycles_skipped_total",
            "Scheduler ticks skipped because a cycle was still running."
        );
        describe_counter!("anomalies_detected_total", "Newly flagged buckets.");
        describe_counter!("events_published_total", "Events accepted by the channel.");
        describe_counter!("events_dropped_total", "Events dropped by the full channel.");
        describe_histogram!("ingest_fetch_ms", "Per-source fetch+parse time in ms.");
        describe_gauge!(
            "ingest_last_cycle_ts",
            "Unix ts when the last cycle finished."
        );
    });
}

/// Normalize feed text: decode HTML entities, strip tags, collapse
/// whitespace, trim.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_tags_and_entities() {
        let s = "<p>Climate&nbsp;summit   opens</p>";
        assert_eq!(clean_text(s), "Climate summit opens");
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a \n\t b  "), "a b");
    }

    #[test]
    fn clean_text_empty_stays_empty() {
        assert_eq!(clean_text("   "), "");
        assert_eq!(clean_text("<br/>"), "");
    }
}
