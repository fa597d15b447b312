//! Repository for the `analyzer_namespace_statuses` table.
//!
//! Counters only ever change through [`AnalyzerNamespaceStatusRepo::add_counts`],
//! an atomic add-on-conflict upsert, so concurrent writers commute.
//!
//! Any transaction that writes counter rows first takes the advisory lock of
//! every namespace whose rows it touches, through
//! [`AnalyzerNamespaceStatusRepo::lock_namespaces`], in ascending ID order.

use secinv_core::analyzer::AnalyzerType;
use secinv_core::diff::CounterDelta;
use secinv_core::types::DbId;
use sqlx::{PgConnection, PgExecutor};

use crate::models::analyzer_status::AnalyzerNamespaceStatusRow;

/// Column list for `analyzer_namespace_statuses` queries.
const COLUMNS: &str = "\
    id, namespace_id, analyzer_type, success, failure, traversal_ids, \
    created_at, updated_at";

/// Provides counter operations for per-namespace analyzer totals.
pub struct AnalyzerNamespaceStatusRepo;

impl AnalyzerNamespaceStatusRepo {
    /// List the counter rows of a namespace.
    pub async fn list_by_namespace<'e>(
        executor: impl PgExecutor<'e>,
        namespace_id: DbId,
    ) -> Result<Vec<AnalyzerNamespaceStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analyzer_namespace_statuses \
             WHERE namespace_id = $1 ORDER BY analyzer_type"
        );
        sqlx::query_as::<_, AnalyzerNamespaceStatusRow>(&query)
            .bind(namespace_id)
            .fetch_all(executor)
            .await
    }

    /// Take a transaction-scoped advisory lock on each namespace.
    ///
    /// `namespace_ids` must be sorted ascending. Keys are the negated IDs so
    /// they never collide with project locks.
    pub async fn lock_namespaces(
        conn: &mut PgConnection,
        namespace_ids: &[DbId],
    ) -> Result<(), sqlx::Error> {
        for namespace_id in namespace_ids {
            sqlx::query("SELECT pg_advisory_xact_lock(-($1::bigint))")
                .bind(namespace_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// IDs of the namespace and of every namespace whose rows sit below it,
    /// ascending.
    pub async fn subtree_namespace_ids<'e>(
        executor: impl PgExecutor<'e>,
        namespace_id: DbId,
        traversal_ids: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT namespace_id FROM analyzer_namespace_statuses \
             WHERE namespace_id = $1 \
             OR (cardinality($2::bigint[]) > 0 \
             AND traversal_ids[1:cardinality($2::bigint[])] = $2::bigint[]) \
             ORDER BY namespace_id",
        )
        .bind(namespace_id)
        .bind(traversal_ids)
        .fetch_all(executor)
        .await
    }

    /// Find a single counter row.
    pub async fn find<'e>(
        executor: impl PgExecutor<'e>,
        namespace_id: DbId,
        analyzer_type: AnalyzerType,
    ) -> Result<Option<AnalyzerNamespaceStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analyzer_namespace_statuses \
             WHERE namespace_id = $1 AND analyzer_type = $2"
        );
        sqlx::query_as::<_, AnalyzerNamespaceStatusRow>(&query)
            .bind(namespace_id)
            .bind(analyzer_type.as_str())
            .fetch_optional(executor)
            .await
    }

    /// Traversal IDs stored on any counter row of the namespace.
    pub async fn find_traversal_ids<'e>(
        executor: impl PgExecutor<'e>,
        namespace_id: DbId,
    ) -> Result<Option<Vec<DbId>>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT traversal_ids FROM analyzer_namespace_statuses \
             WHERE namespace_id = $1 LIMIT 1",
        )
        .bind(namespace_id)
        .fetch_optional(executor)
        .await
    }

    /// Add a signed delta to a counter row, creating it on first use.
    pub async fn add_counts(
        conn: &mut PgConnection,
        delta: &CounterDelta,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO analyzer_namespace_statuses \
                (namespace_id, analyzer_type, success, failure, traversal_ids) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (namespace_id, analyzer_type) DO UPDATE SET \
                success = analyzer_namespace_statuses.success + EXCLUDED.success, \
                failure = analyzer_namespace_statuses.failure + EXCLUDED.failure, \
                updated_at = NOW()",
        )
        .bind(delta.namespace_id)
        .bind(delta.analyzer_type.as_str())
        .bind(delta.success)
        .bind(delta.failure)
        .bind(&delta.traversal_ids)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Up to `limit` namespace IDs greater than `after_namespace_id` whose
    /// rows are stored under `prefix`, ascending.
    pub async fn prefix_batch<'e>(
        executor: impl PgExecutor<'e>,
        prefix: &[DbId],
        after_namespace_id: DbId,
        limit: i64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT DISTINCT namespace_id FROM analyzer_namespace_statuses \
             WHERE cardinality($1::bigint[]) > 0 \
             AND traversal_ids[1:cardinality($1::bigint[])] = $1::bigint[] \
             AND namespace_id > $2 \
             ORDER BY namespace_id \
             LIMIT $3",
        )
        .bind(prefix)
        .bind(after_namespace_id)
        .bind(limit)
        .fetch_all(executor)
        .await
    }

    /// Replace `old_prefix` with `new_prefix` on the rows of the given
    /// namespaces that still start with it.
    ///
    /// Returns the number of rows rewritten.
    pub async fn rewrite_prefix(
        conn: &mut PgConnection,
        namespace_ids: &[DbId],
        old_prefix: &[DbId],
        new_prefix: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analyzer_namespace_statuses \
             SET traversal_ids = $3::bigint[] || traversal_ids[cardinality($2::bigint[]) + 1:], \
             updated_at = NOW() \
             WHERE namespace_id = ANY($1) \
             AND traversal_ids[1:cardinality($2::bigint[])] = $2::bigint[]",
        )
        .bind(namespace_ids)
        .bind(old_prefix)
        .bind(new_prefix)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every row of the given namespaces.
    ///
    /// Returns the number of rows removed.
    pub async fn delete_namespaces(
        conn: &mut PgConnection,
        namespace_ids: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM analyzer_namespace_statuses WHERE namespace_id = ANY($1)")
                .bind(namespace_ids)
                .execute(conn)
                .await?;
        Ok(result.rows_affected())
    }
}
