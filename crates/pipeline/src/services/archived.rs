use secinv_core::error::CoreResult;
use secinv_core::types::DbId;

use crate::context::StatusContext;

/// Mirrors a project's archived flag onto its status rows.
///
/// Counters are untouched: archived projects still count.
pub struct ArchivedUpdateService;

impl ArchivedUpdateService {
    /// Returns the number of rows updated; `0` when the project is gone.
    pub async fn execute(ctx: &StatusContext, project_id: DbId) -> CoreResult<u64> {
        let Some(project) = ctx.hierarchy.project_context(project_id).await? else {
            return Ok(0);
        };
        let updated = ctx.store.set_archived(project_id, project.archived).await?;
        tracing::debug!(project_id, archived = project.archived, updated, "Updated archived flag");
        Ok(updated)
    }
}
