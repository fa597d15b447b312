/// Errors raised while writing or reading outbox events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
