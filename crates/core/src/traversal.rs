//! Helpers over materialized namespace paths ("traversal IDs").
//!
//! A traversal ID array lists namespace IDs from the root down to the
//! namespace itself, so `[1, 2, 3]` is namespace 3 under 2 under root 1.

use crate::types::DbId;

/// The root namespace of a path.
pub fn root_of(traversal_ids: &[DbId]) -> Option<DbId> {
    traversal_ids.first().copied()
}

/// The strict ancestors of the last namespace in the path.
pub fn parent_path(traversal_ids: &[DbId]) -> &[DbId] {
    match traversal_ids.split_last() {
        Some((_, parents)) => parents,
        None => &[],
    }
}

/// Every namespace on the path paired with its own path.
///
/// `[1, 2, 3]` yields `(1, [1])`, `(2, [1, 2])`, `(3, [1, 2, 3])`.
pub fn ancestor_paths(traversal_ids: &[DbId]) -> impl Iterator<Item = (DbId, &[DbId])> {
    traversal_ids
        .iter()
        .enumerate()
        .map(move |(i, id)| (*id, &traversal_ids[..=i]))
}

/// Replace `old_prefix` with `new_prefix`, keeping the remainder of the path.
///
/// Returns `None` when `traversal_ids` does not start with `old_prefix`.
pub fn rewrite_prefix(
    traversal_ids: &[DbId],
    old_prefix: &[DbId],
    new_prefix: &[DbId],
) -> Option<Vec<DbId>> {
    let suffix = traversal_ids.strip_prefix(old_prefix)?;
    let mut rewritten = Vec::with_capacity(new_prefix.len() + suffix.len());
    rewritten.extend_from_slice(new_prefix);
    rewritten.extend_from_slice(suffix);
    Some(rewritten)
}
