//! Repository for the `analyzer_project_statuses` table.
//!
//! Row locks on this table are always taken in `(project_id, analyzer_type)`
//! order, either through an ordered `SELECT ... FOR UPDATE` or after the
//! project's advisory lock.

use secinv_core::status::{CountedLocation, CountedStatus};
use secinv_core::types::DbId;
use sqlx::{PgConnection, PgExecutor};

use crate::models::analyzer_status::AnalyzerProjectStatusRow;

/// Column list for `analyzer_project_statuses` queries.
const COLUMNS: &str = "\
    id, project_id, analyzer_type, status, archived, build_id, last_call, \
    namespace_id, traversal_ids, created_at, updated_at";

/// Render traversal IDs as a Postgres array literal so paths of different
/// lengths can travel through `UNNEST` as `text[]`.
fn array_literal(ids: &[DbId]) -> String {
    let joined: Vec<String> = ids.iter().map(ToString::to_string).collect();
    format!("{{{}}}", joined.join(","))
}

/// Provides read/write operations for per-project analyzer statuses.
pub struct AnalyzerProjectStatusRepo;

impl AnalyzerProjectStatusRepo {
    /// Take a transaction-scoped advisory lock on each project.
    ///
    /// `project_ids` must be sorted so concurrent writers acquire locks in
    /// the same order. Project locks use the positive key space; namespace
    /// locks use the negated ID.
    pub async fn lock_projects(
        conn: &mut PgConnection,
        project_ids: &[DbId],
    ) -> Result<(), sqlx::Error> {
        for project_id in project_ids {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(project_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// List all status rows of the given projects.
    pub async fn list_by_projects<'e>(
        executor: impl PgExecutor<'e>,
        project_ids: &[DbId],
    ) -> Result<Vec<AnalyzerProjectStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analyzer_project_statuses \
             WHERE project_id = ANY($1) \
             ORDER BY project_id, analyzer_type"
        );
        sqlx::query_as::<_, AnalyzerProjectStatusRow>(&query)
            .bind(project_ids)
            .fetch_all(executor)
            .await
    }

    /// List and lock all status rows of the given projects.
    pub async fn list_by_projects_for_update(
        conn: &mut PgConnection,
        project_ids: &[DbId],
    ) -> Result<Vec<AnalyzerProjectStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analyzer_project_statuses \
             WHERE project_id = ANY($1) \
             ORDER BY project_id, analyzer_type \
             FOR UPDATE"
        );
        sqlx::query_as::<_, AnalyzerProjectStatusRow>(&query)
            .bind(project_ids)
            .fetch_all(conn)
            .await
    }

    /// List and lock the rows of every project counted under `prefix`.
    pub async fn list_counted_under_for_update(
        conn: &mut PgConnection,
        prefix: &[DbId],
    ) -> Result<Vec<AnalyzerProjectStatusRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM analyzer_project_statuses \
             WHERE cardinality($1::bigint[]) > 0 \
               AND traversal_ids[1:cardinality($1::bigint[])] = $1::bigint[] \
             ORDER BY project_id, analyzer_type \
             FOR UPDATE"
        );
        sqlx::query_as::<_, AnalyzerProjectStatusRow>(&query)
            .bind(prefix)
            .fetch_all(conn)
            .await
    }

    /// Location a project's rows are counted under.
    pub async fn find_location<'e>(
        executor: impl PgExecutor<'e>,
        project_id: DbId,
    ) -> Result<Option<(DbId, Vec<DbId>)>, sqlx::Error> {
        sqlx::query_as(
            "SELECT namespace_id, traversal_ids FROM analyzer_project_statuses \
             WHERE project_id = $1 LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(executor)
        .await
    }

    /// Insert or replace every row, keyed by `(project_id, analyzer_type)`,
    /// in one statement.
    ///
    /// `rows` must not repeat a key and should be ordered by it.
    pub async fn upsert_all(
        conn: &mut PgConnection,
        rows: &[CountedStatus],
    ) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut project_ids = Vec::with_capacity(rows.len());
        let mut analyzer_types = Vec::with_capacity(rows.len());
        let mut statuses = Vec::with_capacity(rows.len());
        let mut archived = Vec::with_capacity(rows.len());
        let mut build_ids = Vec::with_capacity(rows.len());
        let mut last_calls = Vec::with_capacity(rows.len());
        let mut namespace_ids = Vec::with_capacity(rows.len());
        let mut paths = Vec::with_capacity(rows.len());
        for row in rows {
            project_ids.push(row.status.project_id);
            analyzer_types.push(row.status.analyzer_type.as_str());
            statuses.push(row.status.status.as_str());
            archived.push(row.status.archived);
            build_ids.push(row.status.build_id);
            last_calls.push(row.status.last_call);
            namespace_ids.push(row.location.namespace_id);
            paths.push(array_literal(&row.location.traversal_ids));
        }

        let result = sqlx::query(
            "INSERT INTO analyzer_project_statuses \
                (project_id, analyzer_type, status, archived, build_id, last_call, \
                 namespace_id, traversal_ids) \
             SELECT u.project_id, u.analyzer_type, u.status, u.archived, u.build_id, \
                    u.last_call, u.namespace_id, u.traversal_ids::bigint[] \
             FROM UNNEST($1::bigint[], $2::text[], $3::text[], $4::bool[], $5::bigint[], \
                         $6::timestamptz[], $7::bigint[], $8::text[]) \
                AS u(project_id, analyzer_type, status, archived, build_id, last_call, \
                     namespace_id, traversal_ids) \
             ON CONFLICT (project_id, analyzer_type) DO UPDATE SET \
                status = EXCLUDED.status, \
                archived = EXCLUDED.archived, \
                build_id = EXCLUDED.build_id, \
                last_call = EXCLUDED.last_call, \
                namespace_id = EXCLUDED.namespace_id, \
                traversal_ids = EXCLUDED.traversal_ids, \
                updated_at = NOW()",
        )
        .bind(&project_ids)
        .bind(&analyzer_types)
        .bind(&statuses)
        .bind(&archived)
        .bind(&build_ids)
        .bind(&last_calls)
        .bind(&namespace_ids)
        .bind(&paths)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record a new counted location on every row of each project.
    pub async fn set_locations(
        conn: &mut PgConnection,
        locations: &[(DbId, CountedLocation)],
    ) -> Result<u64, sqlx::Error> {
        if locations.is_empty() {
            return Ok(0);
        }
        let project_ids: Vec<DbId> = locations.iter().map(|(id, _)| *id).collect();
        let namespace_ids: Vec<DbId> = locations.iter().map(|(_, l)| l.namespace_id).collect();
        let paths: Vec<String> = locations
            .iter()
            .map(|(_, l)| array_literal(&l.traversal_ids))
            .collect();

        let result = sqlx::query(
            "UPDATE analyzer_project_statuses s \
             SET namespace_id = u.namespace_id, \
                 traversal_ids = u.traversal_ids::bigint[], \
                 updated_at = NOW() \
             FROM UNNEST($1::bigint[], $2::bigint[], $3::text[]) \
                AS u(project_id, namespace_id, traversal_ids) \
             WHERE s.project_id = u.project_id",
        )
        .bind(&project_ids)
        .bind(&namespace_ids)
        .bind(&paths)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Replace `old_prefix` with `new_prefix` on the counted path of the
    /// given rows.
    pub async fn rewrite_prefix(
        conn: &mut PgConnection,
        ids: &[DbId],
        old_prefix: &[DbId],
        new_prefix: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analyzer_project_statuses \
             SET traversal_ids = $3::bigint[] || traversal_ids[cardinality($2::bigint[]) + 1:], \
                 updated_at = NOW() \
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .bind(old_prefix)
        .bind(new_prefix)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Set the archived flag on every row of a project, locking the rows in
    /// key order first.
    ///
    /// Returns the number of rows updated.
    pub async fn set_archived<'e>(
        executor: impl PgExecutor<'e>,
        project_id: DbId,
        archived: bool,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "WITH locked AS ( \
                SELECT id FROM analyzer_project_statuses \
                WHERE project_id = $1 AND archived <> $2 \
                ORDER BY analyzer_type \
                FOR UPDATE \
             ) \
             UPDATE analyzer_project_statuses s \
             SET archived = $2, updated_at = NOW() \
             FROM locked \
             WHERE s.id = locked.id",
        )
        .bind(project_id)
        .bind(archived)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every row of a project. Returns the number of rows removed.
    pub async fn delete_by_project(
        conn: &mut PgConnection,
        project_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM analyzer_project_statuses WHERE project_id = $1")
            .bind(project_id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete the given rows. Returns the number of rows removed.
    pub async fn delete_by_ids(conn: &mut PgConnection, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM analyzer_project_statuses WHERE id = ANY($1)")
            .bind(ids)
            .execute(conn)
            .await?;
        Ok(result.rows_affected())
    }
}
