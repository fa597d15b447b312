use secinv_core::diff::NamespaceDiff;
use secinv_core::error::CoreResult;

use crate::context::StatusContext;

/// Adds namespace diffs to the counters of every ancestor.
///
/// The diff's own coefficient decides whether contributions are added or
/// retracted; use [`NamespaceDiff::scaled`] to flip one. `not_configured`
/// deltas never reach a counter.
pub struct AncestorsUpdateService;

impl AncestorsUpdateService {
    pub async fn execute(ctx: &StatusContext, namespace_diff: &NamespaceDiff) -> CoreResult<()> {
        Self::execute_all(ctx, std::slice::from_ref(namespace_diff)).await
    }

    /// Apply several diffs in one transaction.
    pub async fn execute_all(ctx: &StatusContext, diffs: &[NamespaceDiff]) -> CoreResult<()> {
        if diffs.iter().all(|d| d.diff.is_empty()) {
            return Ok(());
        }
        ctx.store.apply_namespace_diffs(diffs).await?;
        tracing::debug!(namespaces = diffs.len(), "Applied namespace diffs to ancestors");
        Ok(())
    }
}
