//! Repository for the `projects` mirror table.

use secinv_core::types::DbId;
use sqlx::PgPool;

use crate::models::hierarchy::{Project, ProjectContextRow};

/// Column list for `projects` queries.
const COLUMNS: &str = "id, name, namespace_id, archived, created_at, updated_at";

/// Provides read/write operations for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Insert a new project, returning the created row.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        namespace_id: DbId,
    ) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (name, namespace_id) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(name)
            .bind(namespace_id)
            .fetch_one(pool)
            .await
    }

    /// Find a project by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Projects joined with their namespace path, ordered by project ID.
    /// Missing IDs are skipped.
    pub async fn find_contexts(
        pool: &PgPool,
        ids: &[DbId],
    ) -> Result<Vec<ProjectContextRow>, sqlx::Error> {
        sqlx::query_as::<_, ProjectContextRow>(
            "SELECT p.id AS project_id, p.namespace_id, n.traversal_ids, p.archived \
             FROM projects p \
             JOIN namespaces n ON n.id = p.namespace_id \
             WHERE p.id = ANY($1) \
             ORDER BY p.id",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// Project IDs greater than `after_id`, ascending, keyset-paginated.
    pub async fn list_ids_after(
        pool: &PgPool,
        after_id: DbId,
        limit: i64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM projects WHERE id > $1 ORDER BY id LIMIT $2")
            .bind(after_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Set the archived flag. Returns `true` if the project exists.
    pub async fn set_archived(pool: &PgPool, id: DbId, archived: bool) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE projects SET archived = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(archived)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a project into another namespace. Returns `true` if the project
    /// exists.
    pub async fn move_to(pool: &PgPool, id: DbId, namespace_id: DbId) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE projects SET namespace_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(namespace_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a project. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
