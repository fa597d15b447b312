use secinv_core::error::CoreResult;
use secinv_core::types::DbId;

use crate::context::StatusContext;

/// Namespaces rewritten per statement.
pub const TRAVERSAL_REWRITE_BATCH_SIZE: usize = 500;

/// Keeps the paths stored on counter rows in line with the hierarchy.
pub struct TraversalIdsUpdateService;

impl TraversalIdsUpdateService {
    /// Compare the path stored on the namespace's counter rows with its
    /// current path and rewrite the subtree when they differ.
    ///
    /// Returns the number of counter rows rewritten.
    pub async fn execute(ctx: &StatusContext, namespace_id: DbId) -> CoreResult<u64> {
        let Some(old) = ctx.store.stored_namespace_traversal_ids(namespace_id).await? else {
            return Ok(0);
        };
        let Some(new) = ctx.hierarchy.namespace_traversal_ids(namespace_id).await? else {
            return Ok(0);
        };
        Self::rewrite(ctx, &old, &new).await
    }

    /// Replace `old_prefix` with `new_prefix` on every counter row under it.
    pub async fn rewrite(
        ctx: &StatusContext,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
    ) -> CoreResult<u64> {
        Self::rewrite_in_batches(ctx, old_prefix, new_prefix, TRAVERSAL_REWRITE_BATCH_SIZE).await
    }

    /// [`rewrite`](Self::rewrite) with an explicit batch size.
    ///
    /// Each batch is atomic on its own; a failure leaves earlier batches
    /// applied and the call can simply be repeated.
    pub async fn rewrite_in_batches(
        ctx: &StatusContext,
        old_prefix: &[DbId],
        new_prefix: &[DbId],
        batch_size: usize,
    ) -> CoreResult<u64> {
        if old_prefix.is_empty() || old_prefix == new_prefix || batch_size == 0 {
            return Ok(0);
        }

        let mut cursor: DbId = 0;
        let mut total = 0;
        loop {
            let batch = ctx
                .store
                .rewrite_traversal_prefix_batch(old_prefix, new_prefix, cursor, batch_size)
                .await?;
            total += batch.rows;
            match batch.last_namespace_id {
                Some(last) => cursor = last,
                None => break,
            }
        }

        if total > 0 {
            tracing::info!(
                ?old_prefix,
                ?new_prefix,
                rows = total,
                "Rewrote traversal IDs of analyzer counters"
            );
        }
        Ok(total)
    }
}
