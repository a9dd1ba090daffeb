// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::dedupe::normalize_url;
use crate::ingest::classify::TopicClassifier;
use crate::ingest::clean_text;
use crate::ingest::types::SourceFetcher;
use crate::model::{Item, Source, SourceKind};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    summary: Option<String>,
    author: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
}

fn parse_rfc2822_utc(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// RSS feed fetcher. One bounded-timeout GET per source; the feed body is
/// parsed with serde over quick-xml.
pub struct RssFetcher {
    client: reqwest::Client,
    classifier: Arc<TopicClassifier>,
    default_topic: String,
}

impl RssFetcher {
    pub fn new(
        classifier: Arc<TopicClassifier>,
        default_topic: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .context("building rss http client")?;
        Ok(Self {
            client,
            classifier,
            default_topic: default_topic.to_string(),
        })
    }

    /// Parse a feed body into items. Entries missing a title or link are
    /// skipped, not errors.
    pub fn parse_feed(
        &self,
        body: &str,
        source: &Source,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(body)
            .with_context(|| format!("parsing rss feed for source `{}`", source.name))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for entry in rss.channel.item {
            let title = match entry.title.as_deref().map(clean_text) {
                Some(t) if !t.is_empty() => t,
                _ => continue,
            };
            let link = match entry.link.as_deref().map(str::trim) {
                Some(l) if !l.is_empty() => l.to_string(),
                _ => continue,
            };
            let url = normalize_url(&link);

            let summary = entry
                .summary
                .as_deref()
                .or(entry.description.as_deref())
                .map(clean_text)
                .filter(|s| !s.is_empty());

            let published_at = entry
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822_utc)
                .unwrap_or(fetched_at);

            let topic = self
                .classifier
                .classify(&title, summary.as_deref(), source.topic.as_deref())
                .unwrap_or_else(|| self.default_topic.clone());

            let author = entry
                .author
                .as_deref()
                .or(entry.creator.as_deref())
                .map(clean_text)
                .filter(|a| !a.is_empty());

            let raw = if entry.categories.is_empty() {
                None
            } else {
                Some(serde_json::json!({ "categories": entry.categories }))
            };

            out.push(Item {
                id: 0,
                source: source.name.clone(),
                kind: SourceKind::Rss,
                title,
                url,
                summary,
                topic,
                published_at,
                fetched_at,
                author,
                score: None,
                raw,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_fetch_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceFetcher for RssFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<Item>> {
        let fetched_at = Utc::now();
        let resp = self
            .client
            .get(&source.url_or_id)
            .send()
            .await
            .with_context(|| format!("fetching feed `{}`", source.name))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("feed `{}` returned status {status}", source.name);
        }
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading feed body `{}`", source.name))?;
        self.parse_feed(&body, source, fetched_at)
    }

    fn name(&self) -> &'static str {
        "rss"
    }
}
