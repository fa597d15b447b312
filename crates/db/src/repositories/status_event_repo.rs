//! Repository for the `analyzer_status_events` outbox table.

use secinv_core::types::DbId;
use sqlx::PgPool;

use crate::models::status_event::StatusEvent;

/// Column list for `analyzer_status_events` queries.
const COLUMNS: &str = "\
    id, event_type, payload, attempts, claimed_at, processed_at, last_error, created_at";

/// Claims older than this are considered abandoned and may be re-claimed.
const CLAIM_TIMEOUT_SECS: i64 = 300;

/// Provides outbox operations for analyzer status events.
pub struct StatusEventRepo;

impl StatusEventRepo {
    /// Append an event to the outbox, returning its ID.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO analyzer_status_events (event_type, payload) \
             VALUES ($1, $2) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// Atomically claim up to `limit` pending events, oldest first.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so several workers can poll the
    /// same outbox without claiming the same row. Events that exhausted
    /// `max_attempts` are left alone.
    pub async fn claim_batch(
        pool: &PgPool,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<StatusEvent>, sqlx::Error> {
        let query = format!(
            "UPDATE analyzer_status_events \
             SET claimed_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM analyzer_status_events \
                 WHERE processed_at IS NULL \
                   AND attempts < $2 \
                   AND (claimed_at IS NULL \
                        OR claimed_at < NOW() - make_interval(secs => $3)) \
                 ORDER BY id \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let mut events = sqlx::query_as::<_, StatusEvent>(&query)
            .bind(limit)
            .bind(max_attempts)
            .bind(CLAIM_TIMEOUT_SECS as f64)
            .fetch_all(pool)
            .await?;
        events.sort_by_key(|event| event.id);
        Ok(events)
    }

    /// Mark an event as successfully processed.
    pub async fn mark_processed(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE analyzer_status_events \
             SET processed_at = NOW(), last_error = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt and release the claim so the event is retried.
    pub async fn record_failure(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE analyzer_status_events \
             SET attempts = attempts + 1, last_error = $2, claimed_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find an event by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StatusEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM analyzer_status_events WHERE id = $1");
        sqlx::query_as::<_, StatusEvent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Number of events not yet processed.
    pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM analyzer_status_events WHERE processed_at IS NULL")
            .fetch_one(pool)
            .await
    }
}
