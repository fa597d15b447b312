//! Repository for the `namespaces` mirror table.

use secinv_core::types::DbId;
use sqlx::PgPool;

use crate::models::hierarchy::Namespace;

/// Column list for `namespaces` queries.
const COLUMNS: &str = "id, name, parent_id, traversal_ids, created_at, updated_at";

/// Provides read/write operations for namespaces.
pub struct NamespaceRepo;

impl NamespaceRepo {
    /// Insert a namespace under `parent_id` (or as a root), deriving its
    /// traversal IDs from the parent.
    pub async fn create(
        pool: &PgPool,
        name: &str,
        parent_id: Option<DbId>,
    ) -> Result<Namespace, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let id: DbId =
            sqlx::query_scalar("INSERT INTO namespaces (name, parent_id) VALUES ($1, $2) RETURNING id")
                .bind(name)
                .bind(parent_id)
                .fetch_one(&mut *tx)
                .await?;

        let query = format!(
            "UPDATE namespaces SET traversal_ids = \
                COALESCE((SELECT traversal_ids FROM namespaces WHERE id = $2), '{{}}'::bigint[]) || id \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let namespace = sqlx::query_as::<_, Namespace>(&query)
            .bind(id)
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(namespace)
    }

    /// Find a namespace by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Namespace>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM namespaces WHERE id = $1");
        sqlx::query_as::<_, Namespace>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current traversal IDs of a namespace.
    pub async fn find_traversal_ids(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<Vec<DbId>>, sqlx::Error> {
        sqlx::query_scalar("SELECT traversal_ids FROM namespaces WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Reparent a namespace, rewriting the traversal IDs of its subtree.
    ///
    /// Returns the namespace with its new path, or `None` if it does not
    /// exist.
    pub async fn move_to(
        pool: &PgPool,
        id: DbId,
        new_parent_id: Option<DbId>,
    ) -> Result<Option<Namespace>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let old_path: Option<Vec<DbId>> =
            sqlx::query_scalar("SELECT traversal_ids FROM namespaces WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(old_path) = old_path else {
            return Ok(None);
        };

        let parent_path: Vec<DbId> = match new_parent_id {
            Some(parent_id) => {
                sqlx::query_scalar("SELECT traversal_ids FROM namespaces WHERE id = $1")
                    .bind(parent_id)
                    .fetch_one(&mut *tx)
                    .await?
            }
            None => Vec::new(),
        };
        let mut new_path = parent_path;
        new_path.push(id);

        sqlx::query("UPDATE namespaces SET parent_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(new_parent_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE namespaces \
             SET traversal_ids = $2::bigint[] || traversal_ids[cardinality($1::bigint[]) + 1:], \
                 updated_at = NOW() \
             WHERE traversal_ids[1:cardinality($1::bigint[])] = $1::bigint[]",
        )
        .bind(&old_path)
        .bind(&new_path)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::find_by_id(pool, id).await
    }

    /// Delete a namespace and, through cascades, its subtree and projects.
    ///
    /// Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM namespaces WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
