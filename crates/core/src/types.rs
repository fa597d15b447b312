/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Materialized ancestor path of a namespace, root first, ending with the
/// namespace itself.
pub type TraversalIds = Vec<DbId>;
