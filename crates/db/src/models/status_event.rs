//! Outbox event model.

use secinv_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `analyzer_status_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatusEvent {
    pub id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub claimed_at: Option<Timestamp>,
    pub processed_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
}
