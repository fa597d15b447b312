//! Outbox poller.
//!
//! [`OutboxPoller`] claims pending rows from `analyzer_status_events`, decodes
//! each payload into an [`AnalyzerEvent`](secinv_events::AnalyzerEvent) and
//! hands it to the [`EventDispatcher`]. Successful events are marked
//! processed; failures bump `attempts` and are retried on a later poll until
//! the attempt limit is reached.

use std::time::Duration;

use secinv_db::models::status_event::StatusEvent;
use secinv_db::repositories::StatusEventRepo;
use secinv_db::DbPool;
use secinv_events::EventPersistence;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::EventDispatcher;

/// Counts from a single poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub claimed: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Background service that drains the analyzer event outbox.
pub struct OutboxPoller {
    pool: DbPool,
    dispatcher: EventDispatcher,
    batch_size: i64,
    max_attempts: i32,
    poll_interval: Duration,
}

impl OutboxPoller {
    pub fn new(
        pool: DbPool,
        dispatcher: EventDispatcher,
        batch_size: i64,
        max_attempts: i32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            batch_size,
            max_attempts,
            poll_interval,
        }
    }

    /// Poll until `cancel` is triggered.
    ///
    /// A full batch is followed by another poll straight away so a backlog
    /// drains without waiting for the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.batch_size,
            max_attempts = self.max_attempts,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Outbox poller started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Outbox poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    loop {
                        match self.poll_once().await {
                            Ok(summary) if summary.claimed as i64 >= self.batch_size
                                && !cancel.is_cancelled() => continue,
                            Ok(_) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "Outbox poll failed");
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Claim one batch and dispatch every event in it, oldest first.
    pub async fn poll_once(&self) -> Result<PollSummary, sqlx::Error> {
        let events =
            StatusEventRepo::claim_batch(&self.pool, self.batch_size, self.max_attempts).await?;
        let mut summary = PollSummary {
            claimed: events.len(),
            ..PollSummary::default()
        };

        for event in &events {
            match self.process(event).await {
                Ok(()) => {
                    StatusEventRepo::mark_processed(&self.pool, event.id).await?;
                    summary.processed += 1;
                }
                Err(message) => {
                    tracing::warn!(
                        event_id = event.id,
                        event_type = %event.event_type,
                        attempt = event.attempts + 1,
                        error = %message,
                        "Analyzer event failed"
                    );
                    StatusEventRepo::record_failure(&self.pool, event.id, &message).await?;
                    summary.failed += 1;
                }
            }
        }

        if summary.claimed > 0 {
            tracing::debug!(
                claimed = summary.claimed,
                processed = summary.processed,
                failed = summary.failed,
                "Processed outbox batch"
            );
        }
        Ok(summary)
    }

    async fn process(&self, event: &StatusEvent) -> Result<(), String> {
        let decoded = EventPersistence::decode(&event.payload).map_err(|e| e.to_string())?;
        self.dispatcher
            .handle(&decoded)
            .await
            .map_err(|e| e.to_string())
    }
}
