// src/ingest/providers/reddit.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::dedupe::normalize_url;
use crate::ingest::classify::TopicClassifier;
use crate::ingest::clean_text;
use crate::ingest::types::SourceFetcher;
use crate::model::{Item, Source, SourceKind};

/// Hot-listing page size for subreddits.
const SUBREDDIT_LIMIT: u32 = 25;
/// Newest-submissions page size for users.
const USER_LIMIT: u32 = 10;
/// Selftext is truncated to this many chars for the summary.
const SUMMARY_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Submission,
}

#[derive(Debug, Deserialize)]
struct Submission {
    title: Option<String>,
    permalink: Option<String>,
    #[serde(default)]
    selftext: String,
    created_utc: Option<f64>,
    author: Option<String>,
    score: Option<i64>,
    subreddit: Option<String>,
    num_comments: Option<i64>,
    upvote_ratio: Option<f64>,
}

/// Reddit listing fetcher covering both subreddit-hot and user-newest
/// sources via the public JSON endpoints. Selected by `source.kind`; the
/// orchestrator runs these strictly sequentially.
pub struct RedditFetcher {
    client: reqwest::Client,
    classifier: Arc<TopicClassifier>,
    default_topic: String,
}

impl RedditFetcher {
    pub fn new(
        classifier: Arc<TopicClassifier>,
        default_topic: &str,
        user_agent: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        // Reddit rejects requests without a descriptive User-Agent.
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .context("building reddit http client")?;
        Ok(Self {
            client,
            classifier,
            default_topic: default_topic.to_string(),
        })
    }

    fn listing_url(source: &Source) -> Result<String> {
        match source.kind {
            SourceKind::RedditSub => Ok(format!(
                "https://www.reddit.com/r/{}/hot.json?limit={SUBREDDIT_LIMIT}",
                source.url_or_id
            )),
            SourceKind::RedditUser => Ok(format!(
                "https://www.reddit.com/user/{}/submitted.json?sort=new&limit={USER_LIMIT}",
                source.url_or_id
            )),
            SourceKind::Rss => anyhow::bail!("source `{}` is not a reddit source", source.name),
        }
    }

    fn parse_submission(
        &self,
        submission: Submission,
        source: &Source,
        fetched_at: DateTime<Utc>,
    ) -> Option<Item> {
        let title = clean_text(submission.title.as_deref()?);
        if title.is_empty() {
            return None;
        }
        let permalink = submission.permalink.as_deref()?.trim();
        if permalink.is_empty() {
            return None;
        }
        let url = normalize_url(&format!("https://reddit.com{permalink}"));

        let summary = if submission.selftext.is_empty() {
            None
        } else {
            let cleaned = clean_text(&submission.selftext);
            let truncated: String = cleaned.chars().take(SUMMARY_CHARS).collect();
            (!truncated.is_empty()).then_some(truncated)
        };

        let published_at = submission
            .created_utc
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single())
            .unwrap_or(fetched_at);

        let topic = self
            .classifier
            .classify(&title, summary.as_deref(), source.topic.as_deref())
            .unwrap_or_else(|| self.default_topic.clone());

        Some(Item {
            id: 0,
            source: source.name.clone(),
            kind: source.kind,
            title,
            url,
            summary,
            topic,
            published_at,
            fetched_at,
            author: submission.author,
            score: submission.score,
            raw: Some(serde_json::json!({
                "subreddit": submission.subreddit,
                "num_comments": submission.num_comments,
                "upvote_ratio": submission.upvote_ratio,
            })),
        })
    }

    /// Parse a listing body. Submissions missing a title or permalink are
    /// skipped, not errors.
    pub fn parse_listing(
        &self,
        body: &str,
        source: &Source,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let listing: Listing = serde_json::from_str(body)
            .with_context(|| format!("parsing reddit listing for source `{}`", source.name))?;

        let out: Vec<Item> = listing
            .data
            .children
            .into_iter()
            .filter_map(|child| self.parse_submission(child.data, source, fetched_at))
            .collect();

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_fetch_ms").record(ms);
        counter!("ingest_items_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceFetcher for RedditFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<Item>> {
        let fetched_at = Utc::now();
        let url = Self::listing_url(source)?;
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetching reddit listing `{}`", source.name))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("reddit listing `{}` returned status {status}", source.name);
        }
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading reddit listing body `{}`", source.name))?;
        self.parse_listing(&body, source, fetched_at)
    }

    fn name(&self) -> &'static str {
        "reddit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::classify::TopicRule;
    use chrono::TimeZone;

    const LISTING: &str = r#"{
        "data": {
            "children": [
                {"data": {
                    "title": "Wildfire smoke blankets the coast",
                    "permalink": "/r/News/comments/abc123/wildfire_smoke/",
                    "selftext": "Evacuations are underway as the climate crisis deepens.",
                    "created_utc": 1710415080.0,
                    "author": "reporter42",
                    "score": 512,
                    "subreddit": "News",
                    "num_comments": 87,
                    "upvote_ratio": 0.94
                }},
                {"data": {
                    "title": "",
                    "permalink": "/r/News/comments/def456/empty_title/"
                }},
                {"data": {
                    "title": "No permalink, discarded"
                }}
            ]
        }
    }"#;

    fn fetcher() -> RedditFetcher {
        let rules = vec![TopicRule {
            topic: "environment".into(),
            keywords: vec!["wildfire".into(), "climate".into()],
            phrases: vec![],
        }];
        let classifier = Arc::new(TopicClassifier::new(rules).unwrap());
        RedditFetcher::new(
            classifier,
            "politics",
            "pulsewatch/0.1 test",
            Duration::from_secs(30),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    fn sub_source() -> Source {
        Source {
            name: "r/News".into(),
            kind: SourceKind::RedditSub,
            url_or_id: "News".into(),
            topic: None,
            enabled: true,
        }
    }

    #[test]
    fn parses_submissions_and_skips_incomplete_ones() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap();
        let items = fetcher()
            .parse_listing(LISTING, &sub_source(), fetched_at)
            .unwrap();

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.title, "Wildfire smoke blankets the coast");
        assert_eq!(item.url, "https://reddit.com/r/news/comments/abc123/wildfire_smoke/");
        assert_eq!(item.kind, SourceKind::RedditSub);
        assert_eq!(item.topic, "environment");
        assert_eq!(item.score, Some(512));
        assert_eq!(item.author.as_deref(), Some("reporter42"));
        assert_eq!(
            item.published_at,
            Utc.timestamp_opt(1_710_415_080, 0).single().unwrap()
        );
        assert_eq!(item.fetched_at, fetched_at);
        let raw = item.raw.as_ref().unwrap();
        assert_eq!(raw["subreddit"], "News");
        assert_eq!(raw["num_comments"], 87);
    }

    #[test]
    fn long_selftext_is_truncated() {
        let body = format!(
            r#"{{"data": {{"children": [{{"data": {{
                "title": "Long post",
                "permalink": "/r/News/comments/xyz/long/",
                "selftext": "{}",
                "created_utc": 1710415080.0
            }}}}]}}}}"#,
            "word ".repeat(300).trim_end()
        );
        let fetched_at = Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap();
        let items = fetcher()
            .parse_listing(&body, &sub_source(), fetched_at)
            .unwrap();
        let summary = items[0].summary.as_deref().unwrap();
        assert_eq!(summary.chars().count(), SUMMARY_CHARS);
    }

    #[test]
    fn listing_urls_dispatch_on_kind() {
        let sub = RedditFetcher::listing_url(&sub_source()).unwrap();
        assert_eq!(sub, "https://www.reddit.com/r/News/hot.json?limit=25");

        let user = RedditFetcher::listing_url(&Source {
            name: "u/journalist".into(),
            kind: SourceKind::RedditUser,
            url_or_id: "journalist".into(),
            topic: None,
            enabled: true,
        })
        .unwrap();
        assert_eq!(
            user,
            "https://www.reddit.com/user/journalist/submitted.json?sort=new&limit=10"
        );

        let mut rss = sub_source();
        rss.kind = SourceKind::Rss;
        assert!(RedditFetcher::listing_url(&rss).is_err());
    }

    #[test]
    fn malformed_listing_is_an_error() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap();
        assert!(fetcher()
            .parse_listing("<html>rate limited</html>", &sub_source(), fetched_at)
            .is_err());
    }
}
