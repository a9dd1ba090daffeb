//! PulseWatch — Binary Entrypoint
//! Boots the ingestion pipeline, the cycle scheduler, and the Axum HTTP
//! server (health, news/anomaly queries, live event stream, metrics).

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulsewatch::api::{create_router, AppState};
use pulsewatch::config::{load_sources, Settings};
use pulsewatch::events;
use pulsewatch::ingest::classify::TopicClassifier;
use pulsewatch::ingest::pipeline::IngestPipeline;
use pulsewatch::ingest::providers::{reddit::RedditFetcher, rss::RssFetcher};
use pulsewatch::ingest::scheduler::spawn_cycle_scheduler;
use pulsewatch::metrics::Metrics;
use pulsewatch::store::Store;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulsewatch=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::from_env()?;
    let metrics = Metrics::init(settings.event_capacity);

    // --- Classifier, store, event channel ---
    let classifier = Arc::new(
        TopicClassifier::from_json_file(&settings.topic_rules_path)
            .context("loading topic rules")?,
    );

    let store = Store::new();
    let sources = load_sources(&settings.sources_path).context("loading sources")?;
    let seeded = store.seed_sources_if_empty(sources);
    if seeded > 0 {
        tracing::info!(count = seeded, "loaded sources from config");
    }

    let (bus, stream_rx) = events::channel(settings.event_capacity);

    // --- Fetchers and pipeline ---
    let rss = Arc::new(RssFetcher::new(
        Arc::clone(&classifier),
        &settings.default_topic,
        settings.fetch_timeout,
        settings.connect_timeout,
    )?);
    let reddit = Arc::new(RedditFetcher::new(
        Arc::clone(&classifier),
        &settings.default_topic,
        &settings.reddit_user_agent,
        settings.fetch_timeout,
        settings.connect_timeout,
    )?);

    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        bus,
        rss,
        reddit,
        settings.clone(),
    ));

    let _scheduler = spawn_cycle_scheduler(Arc::clone(&pipeline), settings.ingest_interval_secs);
    tracing::info!(
        interval_secs = settings.ingest_interval_secs,
        granularity = %settings.granularity,
        "cycle scheduler started"
    );

    // --- HTTP surface ---
    let state = AppState::new(pipeline, store, stream_rx);
    let router = create_router(state, &settings.allowed_origins_list()).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, "listening");
    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}
