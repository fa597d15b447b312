//! Counter maintenance when a project leaves or moves within the hierarchy.

use secinv_core::diff::NamespaceDiff;
use secinv_core::error::CoreResult;
use secinv_core::status::ProjectContext;
use secinv_core::types::DbId;

use crate::context::StatusContext;

/// Retracts a deleted project's contribution and removes its rows.
pub struct ProjectDeletedService;

impl ProjectDeletedService {
    /// `project` is the location reported with the deletion. The retraction
    /// is taken from the location the rows are counted under, which differs
    /// when a transfer of the project is still pending.
    pub async fn execute(
        ctx: &StatusContext,
        project: &ProjectContext,
    ) -> CoreResult<Option<NamespaceDiff>> {
        let retraction = ctx.store.delete_project_statuses(project.project_id).await?;
        tracing::info!(
            project_id = project.project_id,
            namespace_id = project.namespace_id,
            counted_namespace_id = retraction.as_ref().map(|diff| diff.namespace_id),
            "Removed analyzer statuses of deleted project"
        );
        Ok(retraction)
    }
}

/// Moves a transferred project's contribution to its new ancestor chain.
pub struct ProjectTransferService;

impl ProjectTransferService {
    /// The contribution moves from where the project is counted to where the
    /// hierarchy has it now. A project a later status update already
    /// relocated, or a redelivered event, moves nothing. The old location
    /// carried by the event is only logged.
    pub async fn execute(
        ctx: &StatusContext,
        project_id: DbId,
        old_namespace_id: DbId,
        old_traversal_ids: &[DbId],
    ) -> CoreResult<Vec<NamespaceDiff>> {
        let Some(to) = ctx.hierarchy.project_context(project_id).await? else {
            return Ok(Vec::new());
        };

        let diffs = ctx.store.transfer_project_statuses(&to).await?;
        tracing::info!(
            project_id,
            from = old_namespace_id,
            ?old_traversal_ids,
            to = to.namespace_id,
            moved = !diffs.is_empty(),
            "Applied project transfer to analyzer counters"
        );
        Ok(diffs)
    }
}
