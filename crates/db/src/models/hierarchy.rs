//! Namespace and project mirror models.

use secinv_core::status::ProjectContext;
use secinv_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `namespaces` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Namespace {
    pub id: DbId,
    pub name: String,
    pub parent_id: Option<DbId>,
    pub traversal_ids: Vec<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub name: String,
    pub namespace_id: DbId,
    pub archived: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A project joined with its namespace's traversal IDs.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectContextRow {
    pub project_id: DbId,
    pub namespace_id: DbId,
    pub traversal_ids: Vec<DbId>,
    pub archived: bool,
}

impl From<ProjectContextRow> for ProjectContext {
    fn from(row: ProjectContextRow) -> Self {
        Self {
            project_id: row.project_id,
            namespace_id: row.namespace_id,
            traversal_ids: row.traversal_ids,
            archived: row.archived,
        }
    }
}
