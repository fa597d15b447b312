//! Counter maintenance when a group moves or is deleted.

use secinv_core::error::CoreResult;
use secinv_core::types::DbId;

use crate::context::StatusContext;
use crate::services::traversal_ids::TraversalIdsUpdateService;

/// Moves the contribution of a transferred group's projects to its new
/// ancestors and rewrites the paths of its subtree.
pub struct GroupTransferService;

impl GroupTransferService {
    /// Projects still counted under `old_traversal_ids` are moved to the
    /// group's current path. Projects a status update already relocated are
    /// no longer counted there and are left alone, as is everything on a
    /// redelivery. Counter rows are then rewritten from the old path, and
    /// from any other path still stored on the group's own rows.
    ///
    /// Returns the number of counter rows whose path was rewritten.
    pub async fn execute(
        ctx: &StatusContext,
        group_id: DbId,
        old_traversal_ids: &[DbId],
    ) -> CoreResult<u64> {
        let Some(new_traversal_ids) = ctx.hierarchy.namespace_traversal_ids(group_id).await? else {
            return Ok(0);
        };

        let diffs = ctx
            .store
            .transfer_subtree_statuses(old_traversal_ids, &new_traversal_ids)
            .await?;
        if !diffs.is_empty() {
            tracing::info!(
                group_id,
                namespaces = diffs.len(),
                "Moved contribution of transferred group"
            );
        }

        let mut rewritten =
            TraversalIdsUpdateService::rewrite(ctx, old_traversal_ids, &new_traversal_ids).await?;
        rewritten += TraversalIdsUpdateService::execute(ctx, group_id).await?;
        tracing::info!(group_id, rewritten, "Applied group transfer to analyzer counters");
        Ok(rewritten)
    }
}

/// Retracts the contribution of a deleted group's projects and removes its
/// subtree's rows.
pub struct GroupDeletedService;

impl GroupDeletedService {
    /// `traversal_ids` is the group's path at deletion time. Rows of projects
    /// counted under it are removed with the group, so later project
    /// deletion events find nothing left to retract. Returns the number of
    /// counter rows removed.
    pub async fn execute(
        ctx: &StatusContext,
        group_id: DbId,
        traversal_ids: &[DbId],
    ) -> CoreResult<u64> {
        let deleted = ctx
            .store
            .delete_namespace_subtree(group_id, traversal_ids)
            .await?;
        tracing::info!(group_id, deleted, "Removed analyzer counters of deleted group");
        Ok(deleted)
    }
}
