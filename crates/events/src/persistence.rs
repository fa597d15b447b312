//! Durable event persistence into the outbox.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and appends every received [`AnalyzerEvent`] to the
//! `analyzer_status_events` table, where the worker's outbox poller picks it
//! up. It runs as a long-lived background task and shuts down when the bus
//! sender is dropped.

use secinv_core::types::DbId;
use secinv_db::repositories::StatusEventRepo;
use secinv_db::DbPool;
use tokio::sync::broadcast;

use crate::error::EventError;
use crate::event::AnalyzerEvent;

/// Background service that writes analyzer events to the outbox.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel is closed.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<AnalyzerEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::enqueue(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = event.event_type(),
                            "Failed to persist analyzer event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    /// Append a single event to the outbox, returning its row ID.
    pub async fn enqueue(pool: &DbPool, event: &AnalyzerEvent) -> Result<DbId, EventError> {
        let payload = serde_json::to_value(event)?;
        let id = StatusEventRepo::insert(pool, event.event_type(), &payload).await?;
        tracing::debug!(event_id = id, event_type = event.event_type(), "Enqueued analyzer event");
        Ok(id)
    }

    /// Decode an outbox payload back into an event.
    pub fn decode(payload: &serde_json::Value) -> Result<AnalyzerEvent, EventError> {
        Ok(serde_json::from_value(payload.clone())?)
    }
}
