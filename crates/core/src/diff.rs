//! Signed status deltas and their propagation plan.
//!
//! A [`Diff`] records net movement, not absolute counts: a project going from
//! `failed` to `success` for `sast` is `{sast: {success: +1, failed: -1}}`.
//! Diffs add component-wise, so they can be merged per namespace and applied
//! to counters in any order.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalyzerStatus, AnalyzerType};
use crate::computation::settle_aggregates;
use crate::status::{
    status_map, CountedLocation, CountedStatus, ProjectAnalyzerStatus, ProjectContext,
    ProjectStatusUpdate, StatusMap,
};
use crate::traversal;
use crate::types::{DbId, TraversalIds};

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Analyzer type to `status -> signed delta`. Zero deltas are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff(BTreeMap<AnalyzerType, BTreeMap<AnalyzerStatus, i64>>);

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the entry for `(analyzer_type, status)`.
    pub fn add(&mut self, analyzer_type: AnalyzerType, status: AnalyzerStatus, delta: i64) {
        if delta == 0 {
            return;
        }
        let per_status = self.0.entry(analyzer_type).or_default();
        let value = per_status.entry(status).or_insert(0);
        *value += delta;
        if *value == 0 {
            per_status.remove(&status);
        }
        if per_status.is_empty() {
            self.0.remove(&analyzer_type);
        }
    }

    pub fn get(&self, analyzer_type: AnalyzerType, status: AnalyzerStatus) -> i64 {
        self.0
            .get(&analyzer_type)
            .and_then(|per_status| per_status.get(&status))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add every entry of `other` into `self`.
    pub fn merge(&mut self, other: &Diff) {
        for (analyzer_type, per_status) in &other.0 {
            for (status, delta) in per_status {
                self.add(*analyzer_type, *status, *delta);
            }
        }
    }

    /// Multiply every delta by `coefficient` (+1 adds a contribution, -1
    /// retracts it).
    pub fn scaled(&self, coefficient: i64) -> Diff {
        let mut scaled = Diff::new();
        for (analyzer_type, per_status) in &self.0 {
            for (status, delta) in per_status {
                scaled.add(*analyzer_type, *status, delta * coefficient);
            }
        }
        scaled
    }

    pub fn negated(&self) -> Diff {
        self.scaled(-1)
    }

    pub fn analyzer_types(&self) -> impl Iterator<Item = AnalyzerType> + '_ {
        self.0.keys().copied()
    }

    /// `(analyzer_type, success delta, failure delta)` for every type with a
    /// non-zero counted delta. `not_configured` is not tracked by counters.
    pub fn counter_deltas(&self) -> impl Iterator<Item = (AnalyzerType, i64, i64)> + '_ {
        self.0.keys().filter_map(|analyzer_type| {
            let success = self.get(*analyzer_type, AnalyzerStatus::Success);
            let failure = self.get(*analyzer_type, AnalyzerStatus::Failed);
            (success != 0 || failure != 0).then_some((*analyzer_type, success, failure))
        })
    }
}

// ---------------------------------------------------------------------------
// NamespaceDiff
// ---------------------------------------------------------------------------

/// A diff addressed to a namespace and, through its traversal IDs, to every
/// ancestor of that namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDiff {
    pub namespace_id: DbId,
    pub traversal_ids: TraversalIds,
    pub diff: Diff,
}

impl NamespaceDiff {
    /// Address `diff` to a counted location.
    pub fn at(location: &CountedLocation, diff: Diff) -> Self {
        Self {
            namespace_id: location.namespace_id,
            traversal_ids: location.traversal_ids.clone(),
            diff,
        }
    }

    pub fn scaled(&self, coefficient: i64) -> Self {
        Self {
            namespace_id: self.namespace_id,
            traversal_ids: self.traversal_ids.clone(),
            diff: self.diff.scaled(coefficient),
        }
    }

    /// Address `diff` to the strict ancestors of the namespace at the end of
    /// `traversal_ids`. `None` for a root namespace or an empty diff.
    pub fn for_strict_ancestors(traversal_ids: &[DbId], diff: Diff) -> Option<Self> {
        let parents = traversal::parent_path(traversal_ids);
        let parent_id = *parents.last()?;
        if diff.is_empty() {
            return None;
        }
        Some(Self {
            namespace_id: parent_id,
            traversal_ids: parents.to_vec(),
            diff,
        })
    }
}

// ---------------------------------------------------------------------------
// Diff engine
// ---------------------------------------------------------------------------

/// Compare a project's new statuses with its stored statuses.
///
/// Each changed analyzer type contributes `+1` for the new status and, when
/// a stored status existed, `-1` for the old one. Types absent from
/// `new_statuses` are left alone. Returns `None` when nothing changed.
pub fn compute_project_diff(
    project: &ProjectContext,
    new_statuses: &StatusMap,
    stored_statuses: &StatusMap,
) -> Option<NamespaceDiff> {
    let mut diff = Diff::new();

    for (analyzer_type, new_status) in new_statuses {
        let old_status = stored_statuses.get(analyzer_type);
        if old_status == Some(new_status) {
            continue;
        }
        diff.add(*analyzer_type, *new_status, 1);
        if let Some(old_status) = old_status {
            diff.add(*analyzer_type, *old_status, -1);
        }
    }

    if diff.is_empty() {
        return None;
    }

    Some(NamespaceDiff {
        namespace_id: project.namespace_id,
        traversal_ids: project.traversal_ids.clone(),
        diff,
    })
}

/// The counted contribution of a project's stored rows: `+1` per `success`
/// or `failed` row.
pub fn contribution_diff(rows: &[ProjectAnalyzerStatus]) -> Diff {
    let mut diff = Diff::new();
    for row in rows.iter().filter(|row| row.status.is_counted()) {
        diff.add(row.analyzer_type, row.status, 1);
    }
    diff
}

/// Diffs that move `contribution` from the `from` chain to the `to` chain.
///
/// Empty when the locations are equal or nothing is counted. Namespaces on
/// both chains receive `-x` and `+x`, which cancel once propagated.
pub fn relocation_diffs(
    contribution: &Diff,
    from: &CountedLocation,
    to: &CountedLocation,
) -> Vec<NamespaceDiff> {
    if from == to || contribution.is_empty() {
        return Vec::new();
    }
    vec![
        NamespaceDiff::at(from, contribution.negated()),
        NamespaceDiff::at(to, contribution.clone()),
    ]
}

// ---------------------------------------------------------------------------
// Diff aggregator
// ---------------------------------------------------------------------------

/// Sums project diffs into one diff per namespace path.
///
/// Keyed by `(namespace_id, traversal_ids)`: after a group move the same
/// namespace can be addressed through its old and its new path, and the two
/// diffs reach different ancestors.
#[derive(Debug, Default)]
pub struct DiffAggregator {
    by_path: HashMap<(DbId, TraversalIds), NamespaceDiff>,
}

impl DiffAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a diff into the accumulator of its namespace path.
    pub fn add(&mut self, namespace_diff: NamespaceDiff) {
        if namespace_diff.diff.is_empty() {
            return;
        }
        let key = (
            namespace_diff.namespace_id,
            namespace_diff.traversal_ids.clone(),
        );
        match self.by_path.get_mut(&key) {
            Some(existing) => existing.diff.merge(&namespace_diff.diff),
            None => {
                self.by_path.insert(key, namespace_diff);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// The accumulated diffs, in no particular order. Namespaces whose
    /// project diffs cancelled out are dropped.
    pub fn into_diffs(self) -> Vec<NamespaceDiff> {
        self.by_path
            .into_values()
            .filter(|namespace_diff| !namespace_diff.diff.is_empty())
            .collect()
    }
}

/// What one commit writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitPlan {
    /// Rows to upsert, one per `(project_id, analyzer_type)`, ordered by
    /// that key. Aggregated parents are already settled.
    pub rows: Vec<CountedStatus>,
    /// Projects whose previously stored rows now count at a new location.
    pub relocated: Vec<(DbId, CountedLocation)>,
    /// Namespace diffs to propagate to every ancestor.
    pub diffs: Vec<NamespaceDiff>,
}

/// Plan a commit of `updates` against the rows stored at commit time.
///
/// For each update, in order:
///
/// - a project counted at a location other than its current one has its
///   stored contribution moved from the counted chain to the current chain;
/// - aggregated parents are settled against the stored rows;
/// - the settled rows are diffed against the stored rows at the current
///   location.
///
/// A project appearing twice is diffed the second time against the rows
/// planned the first time. `stored` and `counted` may cover projects not in
/// `updates`; those are ignored.
pub fn plan_commit(
    updates: &[ProjectStatusUpdate],
    stored: &[ProjectAnalyzerStatus],
    counted: &HashMap<DbId, CountedLocation>,
) -> CommitPlan {
    let mut rows_by_project: HashMap<DbId, Vec<ProjectAnalyzerStatus>> = HashMap::new();
    for row in stored {
        rows_by_project
            .entry(row.project_id)
            .or_default()
            .push(row.clone());
    }
    let mut counted = counted.clone();

    let mut written: BTreeMap<(DbId, AnalyzerType), CountedStatus> = BTreeMap::new();
    let mut relocated: BTreeMap<DbId, CountedLocation> = BTreeMap::new();
    let mut aggregator = DiffAggregator::new();

    for update in updates {
        let project_id = update.project.project_id;
        let current = update.project.location();
        let rows = rows_by_project.entry(project_id).or_default();

        if let Some(previous) = counted.get(&project_id) {
            if *previous != current {
                for diff in relocation_diffs(&contribution_diff(rows), previous, &current) {
                    aggregator.add(diff);
                }
                relocated.insert(project_id, current.clone());
            }
        }

        let settled = settle_aggregates(update, rows);
        let stored_statuses = status_map(rows.iter());
        let new_statuses = status_map(&settled.statuses);
        if let Some(diff) = compute_project_diff(&update.project, &new_statuses, &stored_statuses)
        {
            aggregator.add(diff);
        }

        for status in settled.statuses {
            match rows
                .iter_mut()
                .find(|row| row.analyzer_type == status.analyzer_type)
            {
                Some(row) => *row = status.clone(),
                None => rows.push(status.clone()),
            }
            written.insert(
                (project_id, status.analyzer_type),
                CountedStatus {
                    status,
                    location: current.clone(),
                },
            );
        }
        counted.insert(project_id, current);
    }

    CommitPlan {
        rows: written.into_values().collect(),
        relocated: relocated.into_iter().collect(),
        diffs: aggregator.into_diffs(),
    }
}

// ---------------------------------------------------------------------------
// Ancestor propagation plan
// ---------------------------------------------------------------------------

/// One additive counter upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDelta {
    pub namespace_id: DbId,
    pub analyzer_type: AnalyzerType,
    pub success: i64,
    pub failure: i64,
    /// Path of `namespace_id` itself, stored when the row is first created.
    pub traversal_ids: TraversalIds,
}

/// Expand namespace diffs into one counter delta per `(ancestor, analyzer
/// type)`, inclusive of each namespace itself.
///
/// Deltas hitting the same row are summed and rows that net to zero are
/// dropped. The result is sorted by `(namespace_id, analyzer_type)` so
/// concurrent writers lock rows in the same order.
pub fn ancestor_updates(diffs: &[NamespaceDiff]) -> Vec<CounterDelta> {
    let mut merged: BTreeMap<(DbId, AnalyzerType), CounterDelta> = BTreeMap::new();

    for namespace_diff in diffs {
        for (analyzer_type, success, failure) in namespace_diff.diff.counter_deltas() {
            for (ancestor_id, path) in traversal::ancestor_paths(&namespace_diff.traversal_ids) {
                let delta = merged
                    .entry((ancestor_id, analyzer_type))
                    .or_insert_with(|| CounterDelta {
                        namespace_id: ancestor_id,
                        analyzer_type,
                        success: 0,
                        failure: 0,
                        traversal_ids: path.to_vec(),
                    });
                delta.success += success;
                delta.failure += failure;
            }
        }
    }

    merged
        .into_values()
        .filter(|delta| delta.success != 0 || delta.failure != 0)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use AnalyzerStatus::{Failed, NotConfigured, Success};
    use AnalyzerType::{Dast, Sast, SecretDetection};

    fn project(project_id: DbId, traversal_ids: &[DbId]) -> ProjectContext {
        ProjectContext {
            project_id,
            namespace_id: *traversal_ids.last().unwrap(),
            traversal_ids: traversal_ids.to_vec(),
            archived: false,
        }
    }

    fn location(traversal_ids: &[DbId]) -> CountedLocation {
        CountedLocation {
            namespace_id: *traversal_ids.last().unwrap(),
            traversal_ids: traversal_ids.to_vec(),
        }
    }

    fn map(entries: &[(AnalyzerType, AnalyzerStatus)]) -> StatusMap {
        entries.iter().copied().collect()
    }

    fn row(project_id: DbId, analyzer_type: AnalyzerType, status: AnalyzerStatus) -> ProjectAnalyzerStatus {
        ProjectAnalyzerStatus {
            project_id,
            analyzer_type,
            status,
            archived: false,
            build_id: None,
            last_call: None,
        }
    }

    // -- Diff -----------------------------------------------------------------

    #[test]
    fn add_drops_entries_that_cancel() {
        let mut diff = Diff::new();
        diff.add(Sast, Success, 1);
        diff.add(Sast, Success, -1);
        assert!(diff.is_empty());
    }

    #[test]
    fn zero_delta_is_ignored() {
        let mut diff = Diff::new();
        diff.add(Sast, Success, 0);
        assert!(diff.is_empty());
    }

    #[test]
    fn scaled_by_minus_one_is_inverse() {
        let mut diff = Diff::new();
        diff.add(Sast, Success, 2);
        diff.add(Dast, Failed, -1);

        let mut sum = diff.clone();
        sum.merge(&diff.negated());
        assert!(sum.is_empty());
        assert_eq!(diff.negated().get(Sast, Success), -2);
        assert_eq!(diff.negated().get(Dast, Failed), 1);
    }

    #[test]
    fn counter_deltas_ignore_not_configured() {
        let mut diff = Diff::new();
        diff.add(Sast, NotConfigured, 1);
        diff.add(Dast, Success, 1);
        diff.add(Dast, NotConfigured, -1);

        let deltas: Vec<_> = diff.counter_deltas().collect();
        assert_eq!(deltas, vec![(Dast, 1, 0)]);
    }

    #[test]
    fn diff_serializes_with_status_keys() {
        let mut diff = Diff::new();
        diff.add(Sast, Success, 1);
        diff.add(Sast, Failed, -1);
        let json = serde_json::to_value(&diff).unwrap();
        assert_eq!(json, serde_json::json!({"sast": {"success": 1, "failed": -1}}));
    }

    // -- compute_project_diff -------------------------------------------------

    #[test]
    fn new_analyzer_type_yields_only_positive_entry() {
        let p = project(10, &[1, 2]);
        let diff = compute_project_diff(&p, &map(&[(Sast, Success)]), &map(&[])).unwrap();

        assert_eq!(diff.namespace_id, 2);
        assert_eq!(diff.traversal_ids, vec![1, 2]);
        assert_eq!(diff.diff.get(Sast, Success), 1);
        assert_eq!(diff.diff.analyzer_types().count(), 1);
        assert_eq!(diff.diff.get(Sast, Failed), 0);
    }

    #[test]
    fn flip_from_failed_to_success() {
        let p = project(10, &[1, 2]);
        let diff =
            compute_project_diff(&p, &map(&[(Sast, Success)]), &map(&[(Sast, Failed)])).unwrap();

        assert_eq!(diff.diff.get(Sast, Success), 1);
        assert_eq!(diff.diff.get(Sast, Failed), -1);
    }

    #[test]
    fn unchanged_statuses_yield_no_diff() {
        let p = project(10, &[1, 2]);
        let statuses = map(&[(Sast, Success), (Dast, Failed)]);
        assert_eq!(compute_project_diff(&p, &statuses, &statuses), None);
    }

    #[test]
    fn stored_types_missing_from_new_map_are_untouched() {
        let p = project(10, &[1]);
        let diff = compute_project_diff(
            &p,
            &map(&[(Sast, Success)]),
            &map(&[(Sast, Success), (Dast, Failed)]),
        );
        assert_eq!(diff, None);
    }

    #[test]
    fn transition_to_not_configured_is_recorded() {
        let p = project(10, &[1]);
        let diff = compute_project_diff(
            &p,
            &map(&[(Dast, NotConfigured)]),
            &map(&[(Dast, Success)]),
        )
        .unwrap();
        assert_eq!(diff.diff.get(Dast, NotConfigured), 1);
        assert_eq!(diff.diff.get(Dast, Success), -1);
    }

    // -- contribution / counters ----------------------------------------------

    #[test]
    fn contribution_counts_only_success_and_failed() {
        let rows = vec![
            row(1, Sast, Success),
            row(1, Dast, Failed),
            row(1, SecretDetection, NotConfigured),
        ];
        let diff = contribution_diff(&rows);
        assert_eq!(diff.get(Sast, Success), 1);
        assert_eq!(diff.get(Dast, Failed), 1);
        assert_eq!(diff.get(SecretDetection, NotConfigured), 0);
    }

    #[test]
    fn relocation_moves_contribution_between_chains() {
        let mut contribution = Diff::new();
        contribution.add(Sast, Failed, 1);
        let from = location(&[1, 2, 3]);
        let to = location(&[5]);

        let diffs = relocation_diffs(&contribution, &from, &to);
        let updates = ancestor_updates(&diffs);

        let moved: Vec<(DbId, i64)> =
            updates.iter().map(|u| (u.namespace_id, u.failure)).collect();
        assert_eq!(moved, vec![(1, -1), (2, -1), (3, -1), (5, 1)]);
    }

    #[test]
    fn relocation_within_moved_group_only_touches_old_and_new_roots() {
        let mut contribution = Diff::new();
        contribution.add(Sast, Success, 1);

        let diffs = relocation_diffs(&contribution, &location(&[1, 2, 3]), &location(&[5, 2, 3]));
        let updates = ancestor_updates(&diffs);

        let moved: Vec<(DbId, i64)> =
            updates.iter().map(|u| (u.namespace_id, u.success)).collect();
        assert_eq!(moved, vec![(1, -1), (5, 1)]);
    }

    #[test]
    fn relocation_is_empty_for_same_location_or_nothing_counted() {
        let mut contribution = Diff::new();
        contribution.add(Sast, Success, 1);
        assert!(relocation_diffs(&contribution, &location(&[1, 2]), &location(&[1, 2])).is_empty());
        assert!(relocation_diffs(&Diff::new(), &location(&[1]), &location(&[5])).is_empty());
    }

    #[test]
    fn strict_ancestor_diff_targets_parent() {
        let mut diff = Diff::new();
        diff.add(Sast, Success, 1);

        let nd = NamespaceDiff::for_strict_ancestors(&[1, 2, 3], diff.clone()).unwrap();
        assert_eq!(nd.namespace_id, 2);
        assert_eq!(nd.traversal_ids, vec![1, 2]);

        assert_eq!(NamespaceDiff::for_strict_ancestors(&[1], diff), None);
        assert_eq!(NamespaceDiff::for_strict_ancestors(&[1, 2], Diff::new()), None);
    }

    // -- DiffAggregator -------------------------------------------------------

    #[test]
    fn aggregator_sums_diffs_of_same_namespace() {
        let mut aggregator = DiffAggregator::new();
        let a = compute_project_diff(&project(1, &[1, 2]), &map(&[(Sast, Success)]), &map(&[]));
        let b = compute_project_diff(
            &project(2, &[1, 2]),
            &map(&[(Sast, Success)]),
            &map(&[(Sast, Failed)]),
        );
        let c = compute_project_diff(&project(3, &[1, 4]), &map(&[(Dast, Failed)]), &map(&[]));
        for diff in [a, b, c].into_iter().flatten() {
            aggregator.add(diff);
        }

        let mut diffs = aggregator.into_diffs();
        diffs.sort_by_key(|d| d.namespace_id);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].namespace_id, 2);
        assert_eq!(diffs[0].traversal_ids, vec![1, 2]);
        assert_eq!(diffs[0].diff.get(Sast, Success), 2);
        assert_eq!(diffs[0].diff.get(Sast, Failed), -1);
        assert_eq!(diffs[1].namespace_id, 4);
        assert_eq!(diffs[1].diff.get(Dast, Failed), 1);
    }

    #[test]
    fn aggregator_with_no_changes_is_empty() {
        let mut aggregator = DiffAggregator::new();
        aggregator.add(NamespaceDiff {
            namespace_id: 1,
            traversal_ids: vec![1],
            diff: Diff::new(),
        });
        assert!(aggregator.is_empty());
        assert!(aggregator.into_diffs().is_empty());
    }

    #[test]
    fn aggregator_keeps_old_and_new_paths_of_a_namespace_apart() {
        let mut plus = Diff::new();
        plus.add(Sast, Success, 1);
        let mut aggregator = DiffAggregator::new();
        aggregator.add(NamespaceDiff::at(&location(&[1, 2]), plus.negated()));
        aggregator.add(NamespaceDiff::at(&location(&[5, 2]), plus));

        assert_eq!(aggregator.into_diffs().len(), 2);
    }

    // -- plan_commit ----------------------------------------------------------

    fn update(
        project_id: DbId,
        traversal_ids: &[DbId],
        rows: Vec<ProjectAnalyzerStatus>,
    ) -> ProjectStatusUpdate {
        ProjectStatusUpdate {
            project: project(project_id, traversal_ids),
            statuses: rows,
        }
    }

    fn counted(entries: &[(DbId, &[DbId])]) -> HashMap<DbId, CountedLocation> {
        entries
            .iter()
            .map(|(project_id, traversal_ids)| (*project_id, location(traversal_ids)))
            .collect()
    }

    #[test]
    fn plan_commit_diffs_each_project_against_its_own_rows() {
        let updates = vec![
            update(1, &[1, 2], vec![row(1, Sast, Success)]),
            update(2, &[1, 2], vec![row(2, Sast, Success)]),
        ];
        let stored = vec![row(1, Sast, Success), row(2, Sast, Failed), row(3, Sast, Failed)];

        let plan = plan_commit(&updates, &stored, &counted(&[(1, &[1, 2]), (2, &[1, 2])]));
        assert_eq!(plan.diffs.len(), 1);
        assert_eq!(plan.diffs[0].diff.get(Sast, Success), 1);
        assert_eq!(plan.diffs[0].diff.get(Sast, Failed), -1);
        assert_eq!(plan.rows.len(), 2);
        assert!(plan.relocated.is_empty());
    }

    #[test]
    fn plan_commit_moves_stored_contribution_of_a_moved_project() {
        let updates = vec![update(10, &[5], vec![row(10, Sast, Failed)])];
        let stored = vec![row(10, Sast, Success)];

        let plan = plan_commit(&updates, &stored, &counted(&[(10, &[1, 2, 3])]));
        let mut totals: BTreeMap<DbId, (i64, i64)> = BTreeMap::new();
        for u in ancestor_updates(&plan.diffs) {
            totals.insert(u.namespace_id, (u.success, u.failure));
        }

        assert_eq!(totals[&1], (-1, 0));
        assert_eq!(totals[&3], (-1, 0));
        assert_eq!(totals[&5], (0, 1));
        assert_eq!(plan.relocated, vec![(10, location(&[5]))]);
        assert_eq!(plan.rows[0].location, location(&[5]));
    }

    #[test]
    fn plan_commit_records_location_of_new_projects() {
        let updates = [update(10, &[1, 2], vec![row(10, Dast, Success)])];
        let plan = plan_commit(&updates, &[], &HashMap::new());
        assert!(plan.relocated.is_empty());
        assert_eq!(plan.rows.len(), 1);
        assert_eq!(plan.rows[0].location, location(&[1, 2]));
    }

    #[test]
    fn plan_commit_counts_a_repeated_project_once() {
        let updates = vec![
            update(10, &[1], vec![row(10, Sast, Success)]),
            update(10, &[1], vec![row(10, Sast, Success)]),
        ];

        let plan = plan_commit(&updates, &[], &HashMap::new());
        assert_eq!(plan.diffs.len(), 1);
        assert_eq!(plan.diffs[0].diff.get(Sast, Success), 1);
        assert_eq!(plan.rows.len(), 1);
    }

    #[test]
    fn plan_commit_settles_parent_against_stored_siblings() {
        let parent = row(10, SecretDetection, Success);
        let pushed = row(10, AnalyzerType::SecretDetectionSecretPushProtection, Success);
        let stored = vec![
            row(10, AnalyzerType::SecretDetectionPipelineBased, Failed),
            row(10, SecretDetection, Failed),
        ];

        let plan = plan_commit(
            &[update(10, &[1], vec![pushed, parent])],
            &stored,
            &counted(&[(10, &[1])]),
        );

        let written = plan
            .rows
            .iter()
            .find(|counted| counted.status.analyzer_type == SecretDetection)
            .unwrap();
        assert_eq!(written.status.status, Failed);
        assert!(ancestor_updates(&plan.diffs)
            .iter()
            .all(|u| u.analyzer_type != SecretDetection));
    }

    // -- ancestor_updates -----------------------------------------------------

    #[test]
    fn ancestor_updates_cover_every_ancestor_inclusive() {
        let mut diff = Diff::new();
        diff.add(Sast, Success, 1);
        diff.add(Sast, Failed, -1);
        let updates = ancestor_updates(&[NamespaceDiff {
            namespace_id: 3,
            traversal_ids: vec![1, 2, 3],
            diff,
        }]);

        let ids: Vec<DbId> = updates.iter().map(|u| u.namespace_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(updates[1].traversal_ids, vec![1, 2]);
        assert!(updates.iter().all(|u| u.success == 1 && u.failure == -1));
    }

    #[test]
    fn ancestor_updates_merge_shared_ancestors() {
        let mut plus = Diff::new();
        plus.add(Sast, Success, 1);
        let updates = ancestor_updates(&[
            NamespaceDiff {
                namespace_id: 2,
                traversal_ids: vec![1, 2],
                diff: plus.clone(),
            },
            NamespaceDiff {
                namespace_id: 3,
                traversal_ids: vec![1, 3],
                diff: plus.clone(),
            },
            NamespaceDiff {
                namespace_id: 4,
                traversal_ids: vec![1, 4],
                diff: plus.negated(),
            },
        ]);

        let root = updates.iter().find(|u| u.namespace_id == 1).unwrap();
        assert_eq!(root.success, 1);
        assert_eq!(updates.len(), 4);
    }

    #[test]
    fn ancestor_updates_drop_rows_that_net_to_zero() {
        let mut plus = Diff::new();
        plus.add(Sast, Success, 1);
        let updates = ancestor_updates(&[
            NamespaceDiff {
                namespace_id: 2,
                traversal_ids: vec![1, 2],
                diff: plus.clone(),
            },
            NamespaceDiff {
                namespace_id: 2,
                traversal_ids: vec![1, 2],
                diff: plus.negated(),
            },
        ]);
        assert!(updates.is_empty());
    }

    #[test]
    fn ancestor_updates_skip_not_configured_only_diffs() {
        let mut diff = Diff::new();
        diff.add(Sast, NotConfigured, 1);
        let updates = ancestor_updates(&[NamespaceDiff {
            namespace_id: 2,
            traversal_ids: vec![1, 2],
            diff,
        }]);
        assert!(updates.is_empty());
    }

    #[test]
    fn application_order_does_not_matter() {
        let mut d1 = Diff::new();
        d1.add(Sast, Success, 1);
        d1.add(Sast, Failed, -1);
        let mut d2 = Diff::new();
        d2.add(Sast, Failed, 1);
        d2.add(Dast, Success, 1);
        let nd = |diff: Diff| NamespaceDiff {
            namespace_id: 2,
            traversal_ids: vec![1, 2],
            diff,
        };

        let apply = |batches: Vec<Vec<NamespaceDiff>>| {
            let mut totals: BTreeMap<(DbId, AnalyzerType), (i64, i64)> = BTreeMap::new();
            for batch in batches {
                for u in ancestor_updates(&batch) {
                    let entry = totals.entry((u.namespace_id, u.analyzer_type)).or_default();
                    entry.0 += u.success;
                    entry.1 += u.failure;
                }
            }
            totals
        };

        let mut combined = d1.clone();
        combined.merge(&d2);

        let forward = apply(vec![vec![nd(d1.clone())], vec![nd(d2.clone())]]);
        let backward = apply(vec![vec![nd(d2.clone())], vec![nd(d1.clone())]]);
        let single = apply(vec![vec![nd(combined)]]);
        assert_eq!(forward, backward);
        assert_eq!(forward, single);
    }
}
