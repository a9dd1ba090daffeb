// src/config.rs
//! Process configuration: environment-driven settings plus the file-based
//! source list consumed once at startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::Source;
use crate::timeutil::Granularity;

pub const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";
pub const DEFAULT_TOPIC_RULES_PATH: &str = "config/topic_rules.json";

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Runtime settings, one value per concern, all overridable via `PW_*`
/// environment variables (loaded from `.env` in dev via dotenvy).
#[derive(Debug, Clone)]
pub struct Settings {
    pub sources_path: PathBuf,
    pub topic_rules_path: PathBuf,
    pub bind_addr: String,
    pub allowed_origins: String,
    pub ingest_interval_secs: u64,
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
    /// Smallest aggregation granularity; the cycle aggregates and detects
    /// at this width.
    pub granularity: Granularity,
    pub anomaly_window_buckets: u32,
    pub anomaly_threshold: f64,
    /// Applied when classification returns no topic.
    pub default_topic: String,
    pub reddit_user_agent: String,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources_path: PathBuf::from(DEFAULT_SOURCES_PATH),
            topic_rules_path: PathBuf::from(DEFAULT_TOPIC_RULES_PATH),
            bind_addr: "0.0.0.0:8000".to_string(),
            allowed_origins: "http://localhost:3000".to_string(),
            ingest_interval_secs: 60,
            fetch_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            granularity: Granularity::from_minutes(1).expect("static granularity"),
            anomaly_window_buckets: 288,
            anomaly_threshold: 4.0,
            default_topic: "politics".to_string(),
            reddit_user_agent: "pulsewatch/1.0".to_string(),
            event_capacity: crate::events::DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let granularity = match std::env::var("PW_BUCKET_GRANULARITY") {
            Ok(raw) => Granularity::parse(&raw).context("PW_BUCKET_GRANULARITY")?,
            Err(_) => defaults.granularity,
        };
        Ok(Self {
            sources_path: PathBuf::from(env_string("PW_SOURCES_PATH", DEFAULT_SOURCES_PATH)),
            topic_rules_path: PathBuf::from(env_string(
                "PW_TOPIC_RULES_PATH",
                DEFAULT_TOPIC_RULES_PATH,
            )),
            bind_addr: env_string("PW_BIND_ADDR", &defaults.bind_addr),
            allowed_origins: env_string("PW_ALLOWED_ORIGINS", &defaults.allowed_origins),
            ingest_interval_secs: env_parsed(
                "PW_INGEST_INTERVAL_SECS",
                defaults.ingest_interval_secs,
            ),
            fetch_timeout: Duration::from_secs(env_parsed("PW_FETCH_TIMEOUT_SECS", 30)),
            connect_timeout: Duration::from_secs(env_parsed("PW_CONNECT_TIMEOUT_SECS", 10)),
            granularity,
            anomaly_window_buckets: env_parsed(
                "PW_ANOMALY_WINDOW_BUCKETS",
                defaults.anomaly_window_buckets,
            ),
            anomaly_threshold: env_parsed("PW_ANOMALY_THRESHOLD", defaults.anomaly_threshold),
            default_topic: env_string("PW_DEFAULT_TOPIC", &defaults.default_topic),
            reddit_user_agent: env_string("PW_REDDIT_USER_AGENT", &defaults.reddit_user_agent),
            event_capacity: env_parsed("PW_EVENT_CAPACITY", defaults.event_capacity),
        })
    }

    /// Comma-separated allowed origins, trimmed, empties dropped.
    pub fn allowed_origins_list(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<Source>,
}

/// Load the source list from a TOML file (`[[sources]]` entries).
pub fn load_sources(path: &Path) -> Result<Vec<Source>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let parsed: SourcesFile = toml::from_str(&content).context("parsing sources toml")?;
    Ok(parsed.sources)
}
