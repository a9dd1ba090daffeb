// src/events.rs
//! Best-effort live-event fan-out.
//!
//! A single bounded channel carries "new item" and "new anomaly"
//! notifications from the pipeline to the SSE stream route. `publish`
//! never blocks: a saturated channel drops the event (and bumps a drop
//! counter). The receiver side follows the single-consumer pattern: one
//! live stream drains the queue.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::model::{AnomalyRecord, Item};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Item notification payload, as it appears on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct ItemEvent {
    pub id: i64,
    pub title: String,
    pub source: String,
    pub topic: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

impl From<&Item> for ItemEvent {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            source: item.source.clone(),
            topic: item.topic.clone(),
            url: item.url.clone(),
            published_at: item.published_at,
        }
    }
}

/// Anomaly notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyEvent {
    pub id: i64,
    pub topic: String,
    pub bucket_start: DateTime<Utc>,
    pub observed: u64,
    pub expected: f64,
    pub deviation: f64,
}

impl From<&AnomalyRecord> for AnomalyEvent {
    fn from(a: &AnomalyRecord) -> Self {
        Self {
            id: a.id,
            topic: a.topic.clone(),
            bucket_start: a.bucket_start,
            observed: a.observed,
            expected: a.expected,
            deviation: a.deviation,
        }
    }
}

/// Wire format: `{"type": "item" | "anomaly", "payload": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StreamEvent {
    Item(ItemEvent),
    Anomaly(AnomalyEvent),
}

/// Sender half of the event channel. Cloned into the pipeline.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<StreamEvent>,
}

/// Create the bounded event channel. The receiver goes to the stream
/// route; the bus goes to the pipeline.
pub fn channel(capacity: usize) -> (EventBus, mpsc::Receiver<StreamEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventBus { tx }, rx)
}

impl EventBus {
    /// Non-blocking publish. Drops the event when the channel is full or
    /// the consumer is gone; either way the caller proceeds.
    pub fn publish(&self, event: StreamEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                counter!("events_published_total").increment(1);
            }
            Err(mpsc::error::TrySendError::Full(ev)) => {
                counter!("events_dropped_total").increment(1);
                tracing::debug!(event = ?ev, "event channel full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counter!("events_dropped_total").increment(1);
            }
        }
    }
}
