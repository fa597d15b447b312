//! Analyzer status row models and their conversion into domain types.

use secinv_core::analyzer::{AnalyzerStatus, AnalyzerType};
use secinv_core::error::CoreError;
use secinv_core::status::{CountedLocation, NamespaceAnalyzerStatus, ProjectAnalyzerStatus};
use secinv_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `analyzer_project_statuses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalyzerProjectStatusRow {
    pub id: DbId,
    pub project_id: DbId,
    pub analyzer_type: String,
    pub status: String,
    pub archived: bool,
    pub build_id: Option<DbId>,
    pub last_call: Option<Timestamp>,
    /// Namespace the row is counted under.
    pub namespace_id: DbId,
    pub traversal_ids: Vec<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AnalyzerProjectStatusRow {
    pub fn location(&self) -> CountedLocation {
        CountedLocation {
            namespace_id: self.namespace_id,
            traversal_ids: self.traversal_ids.clone(),
        }
    }
}

impl TryFrom<AnalyzerProjectStatusRow> for ProjectAnalyzerStatus {
    type Error = CoreError;

    fn try_from(row: AnalyzerProjectStatusRow) -> Result<Self, Self::Error> {
        Ok(Self {
            project_id: row.project_id,
            analyzer_type: AnalyzerType::from_str_value(&row.analyzer_type)
                .map_err(CoreError::Internal)?,
            status: AnalyzerStatus::from_str_value(&row.status).map_err(CoreError::Internal)?,
            archived: row.archived,
            build_id: row.build_id,
            last_call: row.last_call,
        })
    }
}

/// A row from the `analyzer_namespace_statuses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnalyzerNamespaceStatusRow {
    pub id: DbId,
    pub namespace_id: DbId,
    pub analyzer_type: String,
    pub success: i64,
    pub failure: i64,
    pub traversal_ids: Vec<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<AnalyzerNamespaceStatusRow> for NamespaceAnalyzerStatus {
    type Error = CoreError;

    fn try_from(row: AnalyzerNamespaceStatusRow) -> Result<Self, Self::Error> {
        Ok(Self {
            namespace_id: row.namespace_id,
            analyzer_type: AnalyzerType::from_str_value(&row.analyzer_type)
                .map_err(CoreError::Internal)?,
            success: row.success,
            failure: row.failure,
            traversal_ids: row.traversal_ids,
        })
    }
}
