// src/ingest/types.rs
use anyhow::Result;

use crate::model::{Item, Source};

/// Capability to fetch raw items from one external source.
///
/// Implementations run the URL normalizer and topic classifier before
/// returning, so every produced item is eligible for persistence as-is.
/// `fetched_at` is taken once per call; all items from one fetch carry the
/// same fetch timestamp. A fetcher that cannot reach its source returns
/// `Err` (zero items) and lets the orchestrator record the failure.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<Item>>;
    fn name(&self) -> &'static str;
}
