//! Shared fixtures for the service tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use secinv_core::analyzer::{BuildStatus, ReportType};
use secinv_core::computation::{CompletedBuild, PipelineSnapshot};
use secinv_core::error::CoreError;
use secinv_core::feature_gate::{FeatureGate, RootAllowList};
use secinv_core::memory::MemoryStore;
use secinv_core::types::DbId;
use secinv_pipeline::{ErrorContext, ErrorTracker, StatusContext};

/// Tracker that remembers every reported error.
#[derive(Default)]
pub struct RecordingTracker {
    pub tracked: Mutex<Vec<(String, ErrorContext)>>,
}

impl ErrorTracker for RecordingTracker {
    fn track(&self, error: &CoreError, context: ErrorContext) {
        self.tracked
            .lock()
            .unwrap()
            .push((error.to_string(), context));
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub tracker: Arc<RecordingTracker>,
    pub ctx: StatusContext,
}

pub fn harness() -> Harness {
    harness_with_gate(Arc::new(RootAllowList::All))
}

pub fn harness_with_gate(gate: Arc<dyn FeatureGate>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let tracker = Arc::new(RecordingTracker::default());
    let ctx = StatusContext::from_backend(store.clone(), gate, tracker.clone());
    Harness {
        store,
        tracker,
        ctx,
    }
}

/// Root 1 -> group 2 -> subgroup 3, plus a second root 5.
pub async fn seed_hierarchy(store: &MemoryStore) {
    store.add_namespace(1, None).await;
    store.add_namespace(2, Some(1)).await;
    store.add_namespace(3, Some(2)).await;
    store.add_namespace(5, None).await;
}

pub fn build(id: DbId, name: &str, status: BuildStatus, reports: &[ReportType]) -> CompletedBuild {
    CompletedBuild {
        id,
        name: name.to_string(),
        status,
        report_types: reports.to_vec(),
        started_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 11, 59, 0).unwrap(),
    }
}

pub fn pipeline(id: DbId, project_id: DbId, builds: Vec<CompletedBuild>) -> PipelineSnapshot {
    PipelineSnapshot {
        id,
        project_id,
        on_default_branch: true,
        builds,
    }
}
