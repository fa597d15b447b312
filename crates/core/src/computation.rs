//! Status computation from completed CI pipelines and from security settings.
//!
//! Pure functions: callers load the pipeline, the project's hierarchy
//! context and its stored rows, and persist the result themselves.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalyzerKind, AnalyzerStatus, AnalyzerType, BuildStatus, ReportType, SettingSource};
use crate::error::CoreError;
use crate::status::{ProjectAnalyzerStatus, ProjectContext, ProjectStatusUpdate};
use crate::types::{DbId, Timestamp};

/// Maximum number of projects a settings-based update may cover.
pub const MAX_PROJECT_IDS: usize = 1000;

// ---------------------------------------------------------------------------
// Pipeline input
// ---------------------------------------------------------------------------

/// A finished CI build as seen by the status engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedBuild {
    pub id: DbId,
    pub name: String,
    pub status: BuildStatus,
    /// Report artifact types the build declares.
    #[serde(default)]
    pub report_types: Vec<ReportType>,
    pub started_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl CompletedBuild {
    /// When the build ran: `started_at`, falling back to `created_at`.
    pub fn last_call(&self) -> Timestamp {
        self.started_at.unwrap_or(self.created_at)
    }
}

/// A completed pipeline and its builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub id: DbId,
    pub project_id: DbId,
    /// Whether the pipeline ran on the project's default branch.
    pub on_default_branch: bool,
    #[serde(default)]
    pub builds: Vec<CompletedBuild>,
}

/// Computed rows keyed by analyzer type.
pub type ComputedStatuses = BTreeMap<AnalyzerType, ProjectAnalyzerStatus>;

// ---------------------------------------------------------------------------
// Pipeline-based computation
// ---------------------------------------------------------------------------

/// Compute the new analyzer statuses of a project from a completed pipeline.
///
/// - Each security report a build declares maps to one analyzer type; when
///   several builds map to the same type the higher-precedence status wins
///   (`failed` > `success` > `not_configured`), first build on ties.
/// - Pipeline-based types with a stored row but no build in this pipeline
///   become `not_configured`. Setting-based rows are never touched here.
/// - Aggregated types are rolled up from their children afterwards.
pub fn compute_pipeline_statuses(
    pipeline: &PipelineSnapshot,
    project: &ProjectContext,
    stored: &[ProjectAnalyzerStatus],
) -> ComputedStatuses {
    let mut computed = ComputedStatuses::new();

    for build in &pipeline.builds {
        let status = build.status.analyzer_status();
        for report_type in &build.report_types {
            let Some(analyzer_type) = report_type.analyzer_type(&build.name) else {
                continue;
            };
            let candidate = ProjectAnalyzerStatus {
                project_id: project.project_id,
                analyzer_type,
                status,
                archived: project.archived,
                build_id: Some(build.id),
                last_call: Some(build.last_call()),
            };
            match computed.entry(analyzer_type) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    if status.outranks(slot.get().status) {
                        slot.insert(candidate);
                    }
                }
            }
        }
    }

    for row in stored {
        if row.analyzer_type.is_pipeline_based() && !computed.contains_key(&row.analyzer_type) {
            computed.insert(
                row.analyzer_type,
                ProjectAnalyzerStatus::without_build(
                    project,
                    row.analyzer_type,
                    AnalyzerStatus::NotConfigured,
                ),
            );
        }
    }

    for parent in AnalyzerType::AGGREGATED {
        if let Some(aggregated) = aggregate_status(parent, project, &computed, stored) {
            computed.insert(parent, aggregated);
        }
    }

    computed
}

// ---------------------------------------------------------------------------
// Settings-based computation
// ---------------------------------------------------------------------------

/// Reject a settings-based batch larger than [`MAX_PROJECT_IDS`].
pub fn ensure_batch_within_limit(project_ids: &[DbId]) -> Result<(), CoreError> {
    if project_ids.len() > MAX_PROJECT_IDS {
        return Err(CoreError::TooManyProjectIds {
            max: MAX_PROJECT_IDS,
        });
    }
    Ok(())
}

/// Compute a project's setting-based status and its aggregated parent.
///
/// `enabled` maps to `success`, disabled to `not_configured`; settings can
/// never produce `failed`. The parent is rolled up from the new setting
/// status and the stored status of its other children.
pub fn compute_setting_statuses(
    source: SettingSource,
    project: &ProjectContext,
    enabled: bool,
    stored: &[ProjectAnalyzerStatus],
) -> ComputedStatuses {
    let status = if enabled {
        AnalyzerStatus::Success
    } else {
        AnalyzerStatus::NotConfigured
    };

    let mut computed = ComputedStatuses::new();
    computed.insert(
        source.analyzer_type,
        ProjectAnalyzerStatus::without_build(project, source.analyzer_type, status),
    );

    if let Some(parent) = source.analyzer_type.aggregated_parent() {
        if let Some(aggregated) = aggregate_status(parent, project, &computed, stored) {
            computed.insert(parent, aggregated);
        }
    }

    computed
}

/// Settings lookup result for a batch, defaulting missing records to
/// disabled.
pub fn setting_enabled(settings: &HashMap<DbId, bool>, project_id: DbId) -> bool {
    settings.get(&project_id).copied().unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Roll every aggregated type touched by `update` up again, this time
/// against `stored`, the project's rows as they are at commit time.
///
/// Callers compute updates from rows read earlier; a sibling written in
/// between would otherwise be masked by a stale parent. Parents none of
/// whose children are in the update are left as they are.
pub fn settle_aggregates(
    update: &ProjectStatusUpdate,
    stored: &[ProjectAnalyzerStatus],
) -> ProjectStatusUpdate {
    let mut computed: ComputedStatuses = update
        .statuses
        .iter()
        .map(|row| (row.analyzer_type, row.clone()))
        .collect();

    for parent in AnalyzerType::AGGREGATED {
        let touched = parent
            .aggregated_children()
            .iter()
            .any(|child| computed.contains_key(child));
        if !touched {
            continue;
        }
        if let Some(aggregated) = aggregate_status(parent, &update.project, &computed, stored) {
            computed.insert(parent, aggregated);
        }
    }

    ProjectStatusUpdate {
        project: update.project.clone(),
        statuses: computed.into_values().collect(),
    }
}

/// Roll an aggregated type up from its children.
///
/// Each child contributes its freshly computed status when there is one and
/// its stored status otherwise. The highest-precedence child wins; its build
/// is carried over when it was computed in this run. `None` when no child has
/// any status.
fn aggregate_status(
    parent: AnalyzerType,
    project: &ProjectContext,
    computed: &ComputedStatuses,
    stored: &[ProjectAnalyzerStatus],
) -> Option<ProjectAnalyzerStatus> {
    debug_assert_eq!(parent.kind(), AnalyzerKind::Aggregated);

    let mut winner: Option<ProjectAnalyzerStatus> = None;
    for child in parent.aggregated_children() {
        let child_row = computed.get(child).cloned().or_else(|| {
            stored
                .iter()
                .find(|row| row.analyzer_type == *child)
                .map(|row| ProjectAnalyzerStatus::without_build(project, *child, row.status))
        });
        let Some(child_row) = child_row else {
            continue;
        };
        let replace = winner
            .as_ref()
            .map_or(true, |current| child_row.status.outranks(current.status));
        if replace {
            winner = Some(child_row);
        }
    }

    winner.map(|child_row| ProjectAnalyzerStatus {
        analyzer_type: parent,
        ..child_row
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use AnalyzerStatus::{Failed, NotConfigured, Success};
    use AnalyzerType::*;

    fn project() -> ProjectContext {
        ProjectContext {
            project_id: 7,
            namespace_id: 2,
            traversal_ids: vec![1, 2],
            archived: false,
        }
    }

    fn ts(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).unwrap()
    }

    fn build(id: DbId, name: &str, status: BuildStatus, reports: &[ReportType]) -> CompletedBuild {
        CompletedBuild {
            id,
            name: name.to_string(),
            status,
            report_types: reports.to_vec(),
            started_at: Some(ts(5)),
            created_at: ts(1),
        }
    }

    fn pipeline(builds: Vec<CompletedBuild>) -> PipelineSnapshot {
        PipelineSnapshot {
            id: 100,
            project_id: 7,
            on_default_branch: true,
            builds,
        }
    }

    fn stored(analyzer_type: AnalyzerType, status: AnalyzerStatus) -> ProjectAnalyzerStatus {
        ProjectAnalyzerStatus::without_build(&project(), analyzer_type, status)
    }

    fn status_of(computed: &ComputedStatuses, analyzer_type: AnalyzerType) -> Option<AnalyzerStatus> {
        computed.get(&analyzer_type).map(|row| row.status)
    }

    // -- compute_pipeline_statuses --------------------------------------------

    #[test]
    fn various_security_jobs_produce_expected_rows() {
        let p = pipeline(vec![
            build(1, "semgrep-sast", BuildStatus::Success, &[ReportType::Sast]),
            build(2, "gemnasium", BuildStatus::Canceled, &[ReportType::DependencyScanning]),
            build(3, "container_scanning", BuildStatus::Skipped, &[ReportType::ContainerScanning]),
            build(4, "secret_detection", BuildStatus::Success, &[ReportType::SecretDetection]),
            build(5, "kics-iac-sast", BuildStatus::Success, &[ReportType::Sast]),
            build(6, "gitlab-advanced-sast", BuildStatus::Success, &[ReportType::Sast]),
        ]);

        let computed = compute_pipeline_statuses(&p, &project(), &[]);

        assert_eq!(computed.len(), 8);
        assert_eq!(status_of(&computed, Sast), Some(Success));
        assert_eq!(computed[&Sast].build_id, Some(1));
        assert_eq!(status_of(&computed, DependencyScanning), Some(Failed));
        assert_eq!(status_of(&computed, ContainerScanningPipelineBased), Some(Failed));
        assert_eq!(status_of(&computed, ContainerScanning), Some(Failed));
        assert_eq!(status_of(&computed, SecretDetectionPipelineBased), Some(Success));
        assert_eq!(status_of(&computed, SecretDetection), Some(Success));
        assert_eq!(computed[&SastIac].build_id, Some(5));
        assert_eq!(computed[&SastAdvanced].build_id, Some(6));
    }

    #[test]
    fn last_call_prefers_started_at() {
        let mut unstarted = build(1, "sast", BuildStatus::Success, &[ReportType::Sast]);
        unstarted.started_at = None;
        let started = build(2, "dast", BuildStatus::Success, &[ReportType::Dast]);

        let computed = compute_pipeline_statuses(&pipeline(vec![unstarted, started]), &project(), &[]);
        assert_eq!(computed[&Sast].last_call, Some(ts(1)));
        assert_eq!(computed[&Dast].last_call, Some(ts(5)));
    }

    #[test]
    fn failed_job_wins_over_successful_job_of_same_type() {
        let p = pipeline(vec![
            build(1, "sast-a", BuildStatus::Success, &[ReportType::Sast]),
            build(2, "sast-b", BuildStatus::Failed, &[ReportType::Sast]),
            build(3, "gitlab-advanced-sast", BuildStatus::Failed, &[ReportType::Sast]),
        ]);

        let computed = compute_pipeline_statuses(&p, &project(), &[]);
        assert_eq!(computed.len(), 2);
        assert_eq!(status_of(&computed, Sast), Some(Failed));
        assert_eq!(computed[&Sast].build_id, Some(2));
        assert_eq!(status_of(&computed, SastAdvanced), Some(Failed));
    }

    #[test]
    fn duplicate_precedence_for_every_pair() {
        let cases = [
            (BuildStatus::Success, BuildStatus::Success, Success),
            (BuildStatus::Success, BuildStatus::Failed, Failed),
            (BuildStatus::Success, BuildStatus::Manual, Success),
            (BuildStatus::Failed, BuildStatus::Success, Failed),
            (BuildStatus::Failed, BuildStatus::Failed, Failed),
            (BuildStatus::Failed, BuildStatus::Manual, Failed),
            (BuildStatus::Manual, BuildStatus::Success, Success),
            (BuildStatus::Manual, BuildStatus::Failed, Failed),
            (BuildStatus::Manual, BuildStatus::Manual, NotConfigured),
            (BuildStatus::Skipped, BuildStatus::Success, Failed),
        ];
        for (first, second, expected) in cases {
            let p = pipeline(vec![
                build(1, "dast-1", first, &[ReportType::Dast]),
                build(2, "dast-2", second, &[ReportType::Dast]),
            ]);
            let computed = compute_pipeline_statuses(&p, &project(), &[]);
            assert_eq!(
                status_of(&computed, Dast),
                Some(expected),
                "{first:?} then {second:?}"
            );
        }
    }

    #[test]
    fn ties_keep_first_build() {
        let p = pipeline(vec![
            build(1, "dast-1", BuildStatus::Success, &[ReportType::Dast]),
            build(2, "dast-2", BuildStatus::Success, &[ReportType::Dast]),
        ]);
        let computed = compute_pipeline_statuses(&p, &project(), &[]);
        assert_eq!(computed[&Dast].build_id, Some(1));
    }

    #[test]
    fn build_with_multiple_reports_feeds_every_type() {
        let p = pipeline(vec![build(
            1,
            "multi-scanner",
            BuildStatus::Success,
            &[ReportType::Sast, ReportType::Dast, ReportType::DependencyScanning],
        )]);

        let computed = compute_pipeline_statuses(&p, &project(), &[]);
        assert_eq!(computed.len(), 3);
        for t in [Sast, Dast, DependencyScanning] {
            assert_eq!(status_of(&computed, t), Some(Success));
        }
    }

    #[test]
    fn stored_pipeline_types_missing_from_pipeline_become_not_configured() {
        let p = pipeline(vec![build(1, "sast", BuildStatus::Success, &[ReportType::Sast])]);
        let rows = vec![stored(Dast, Success)];

        let computed = compute_pipeline_statuses(&p, &project(), &rows);
        assert_eq!(status_of(&computed, Dast), Some(NotConfigured));
        assert_eq!(computed[&Dast].build_id, None);
    }

    #[test]
    fn setting_based_rows_are_not_reset_by_pipeline() {
        let p = pipeline(vec![build(1, "sast", BuildStatus::Success, &[ReportType::Sast])]);
        let rows = vec![stored(SecretDetectionSecretPushProtection, Success)];

        let computed = compute_pipeline_statuses(&p, &project(), &rows);
        assert!(!computed.contains_key(&SecretDetectionSecretPushProtection));
        assert_eq!(status_of(&computed, SecretDetection), Some(Success));
    }

    #[test]
    fn non_security_builds_reset_stored_pipeline_types() {
        let p = pipeline(vec![build(1, "rspec", BuildStatus::Success, &[ReportType::Other])]);
        let rows = vec![
            stored(Sast, Success),
            stored(Dast, Failed),
            stored(SecretDetectionPipelineBased, Success),
        ];

        let computed = compute_pipeline_statuses(&p, &project(), &rows);
        assert_eq!(status_of(&computed, Sast), Some(NotConfigured));
        assert_eq!(status_of(&computed, Dast), Some(NotConfigured));
        assert_eq!(status_of(&computed, SecretDetectionPipelineBased), Some(NotConfigured));
        assert_eq!(status_of(&computed, SecretDetection), Some(NotConfigured));
    }

    #[test]
    fn no_aggregated_rows_without_children() {
        let p = pipeline(vec![
            build(1, "sast", BuildStatus::Success, &[ReportType::Sast]),
            build(2, "dast", BuildStatus::Failed, &[ReportType::Dast]),
        ]);
        let computed = compute_pipeline_statuses(&p, &project(), &[]);
        assert!(!computed.contains_key(&SecretDetection));
        assert!(!computed.contains_key(&ContainerScanning));
    }

    #[test]
    fn aggregated_status_follows_child_precedence() {
        // (pipeline build status, stored setting status, expected aggregated)
        let cases = [
            (BuildStatus::Success, NotConfigured, Success),
            (BuildStatus::Failed, Success, Failed),
            (BuildStatus::Success, Success, Success),
            (BuildStatus::Success, Failed, Failed),
            (BuildStatus::Manual, NotConfigured, NotConfigured),
            (BuildStatus::Manual, Success, Success),
        ];
        for (build_status, setting_status, expected) in cases {
            let p = pipeline(vec![build(
                9,
                "container_scanning",
                build_status,
                &[ReportType::ContainerScanning],
            )]);
            let rows = vec![stored(ContainerScanningForRegistry, setting_status)];
            let computed = compute_pipeline_statuses(&p, &project(), &rows);
            assert_eq!(
                status_of(&computed, ContainerScanning),
                Some(expected),
                "{build_status:?} with setting {setting_status:?}"
            );
        }
    }

    #[test]
    fn aggregated_row_carries_winning_build() {
        let p = pipeline(vec![build(
            4,
            "secret_detection",
            BuildStatus::Success,
            &[ReportType::SecretDetection],
        )]);
        let rows = vec![stored(SecretDetectionSecretPushProtection, NotConfigured)];

        let computed = compute_pipeline_statuses(&p, &project(), &rows);
        assert_eq!(computed[&SecretDetection].build_id, Some(4));
        assert_eq!(computed[&SecretDetection].last_call, Some(ts(5)));
    }

    #[test]
    fn aggregated_row_from_setting_child_has_no_build() {
        let p = pipeline(vec![build(
            4,
            "container_scanning",
            BuildStatus::Success,
            &[ReportType::ContainerScanning],
        )]);
        let rows = vec![stored(ContainerScanningForRegistry, Failed)];

        let computed = compute_pipeline_statuses(&p, &project(), &rows);
        assert_eq!(computed[&ContainerScanning].status, Failed);
        assert_eq!(computed[&ContainerScanning].build_id, None);
    }

    #[test]
    fn rows_mirror_project_archival() {
        let mut archived = project();
        archived.archived = true;
        let p = pipeline(vec![build(1, "sast", BuildStatus::Success, &[ReportType::Sast])]);

        let computed = compute_pipeline_statuses(&p, &archived, &[]);
        assert!(computed.values().all(|row| row.archived));
    }

    // -- compute_setting_statuses ---------------------------------------------

    fn secret_source() -> SettingSource {
        SecretDetection.setting_source().unwrap()
    }

    #[test]
    fn enabled_setting_is_success() {
        let computed = compute_setting_statuses(secret_source(), &project(), true, &[]);
        assert_eq!(status_of(&computed, SecretDetectionSecretPushProtection), Some(Success));
        assert_eq!(status_of(&computed, SecretDetection), Some(Success));
        assert_eq!(computed.len(), 2);
    }

    #[test]
    fn disabled_setting_is_not_configured() {
        let computed = compute_setting_statuses(secret_source(), &project(), false, &[]);
        assert_eq!(
            status_of(&computed, SecretDetectionSecretPushProtection),
            Some(NotConfigured)
        );
        assert_eq!(status_of(&computed, SecretDetection), Some(NotConfigured));
    }

    #[test]
    fn stored_pipeline_failure_outranks_enabled_setting() {
        let rows = vec![stored(SecretDetectionPipelineBased, Failed)];
        let computed = compute_setting_statuses(secret_source(), &project(), true, &rows);
        assert_eq!(status_of(&computed, SecretDetection), Some(Failed));
    }

    #[test]
    fn stored_pipeline_success_outranks_disabled_setting() {
        let rows = vec![stored(SecretDetectionPipelineBased, Success)];
        let computed = compute_setting_statuses(secret_source(), &project(), false, &rows);
        assert_eq!(status_of(&computed, SecretDetection), Some(Success));
    }

    #[test]
    fn setting_rows_never_fail() {
        for enabled in [true, false] {
            let computed = compute_setting_statuses(secret_source(), &project(), enabled, &[]);
            assert_ne!(status_of(&computed, SecretDetectionSecretPushProtection), Some(Failed));
        }
    }

    #[test]
    fn missing_settings_default_to_disabled() {
        let settings = HashMap::from([(1, true)]);
        assert!(setting_enabled(&settings, 1));
        assert!(!setting_enabled(&settings, 2));
    }

    // -- settle_aggregates ----------------------------------------------------

    fn settings_update(rows: Vec<ProjectAnalyzerStatus>) -> ProjectStatusUpdate {
        ProjectStatusUpdate {
            project: project(),
            statuses: rows,
        }
    }

    #[test]
    fn settled_parent_sees_sibling_failed_since_computation() {
        // Computed while the pipeline sibling still read as success.
        let computed = compute_setting_statuses(
            secret_source(),
            &project(),
            true,
            &[stored(SecretDetectionPipelineBased, Success)],
        );
        let update = settings_update(computed.into_values().collect());
        let current = vec![stored(SecretDetectionPipelineBased, Failed)];

        let settled = settle_aggregates(&update, &current);

        let parent = settled
            .statuses
            .iter()
            .find(|row| row.analyzer_type == SecretDetection)
            .unwrap();
        assert_eq!(parent.status, Failed);
        assert_eq!(settled.statuses.len(), 2);
    }

    #[test]
    fn settled_parent_keeps_computed_build() {
        let p = pipeline(vec![build(
            9,
            "secret_detection",
            BuildStatus::Failed,
            &[ReportType::SecretDetection],
        )]);
        let computed = compute_pipeline_statuses(&p, &project(), &[]);
        let update = settings_update(computed.into_values().collect());

        let settled =
            settle_aggregates(&update, &[stored(SecretDetectionSecretPushProtection, Success)]);

        let parent = settled
            .statuses
            .iter()
            .find(|row| row.analyzer_type == SecretDetection)
            .unwrap();
        assert_eq!(parent.status, Failed);
        assert_eq!(parent.build_id, Some(9));
    }

    #[test]
    fn untouched_parents_are_not_added() {
        let update = settings_update(vec![stored(Sast, Success)]);
        let settled = settle_aggregates(&update, &[stored(ContainerScanningForRegistry, Success)]);
        assert_eq!(settled.statuses, vec![stored(Sast, Success)]);
    }

    // -- ensure_batch_within_limit --------------------------------------------

    #[test]
    fn batch_at_limit_is_accepted() {
        let ids: Vec<DbId> = (1..=MAX_PROJECT_IDS as DbId).collect();
        assert!(ensure_batch_within_limit(&ids).is_ok());
    }

    #[test]
    fn batch_over_limit_is_rejected() {
        let ids: Vec<DbId> = (1..=(MAX_PROJECT_IDS as DbId + 1)).collect();
        let err = ensure_batch_within_limit(&ids).unwrap_err();
        assert_matches!(err, CoreError::TooManyProjectIds { max } if max == MAX_PROJECT_IDS);
        assert_eq!(
            err.to_string(),
            format!("Cannot update analyzer statuses of more than {MAX_PROJECT_IDS} projects")
        );
    }
}
