use std::sync::Arc;

use secinv_core::feature_gate::FeatureGate;
use secinv_core::store::{AnalyzerStatusStore, HierarchySource};

use crate::tracking::ErrorTracker;

/// Collaborators shared by every status service.
#[derive(Clone)]
pub struct StatusContext {
    pub store: Arc<dyn AnalyzerStatusStore>,
    pub hierarchy: Arc<dyn HierarchySource>,
    pub gate: Arc<dyn FeatureGate>,
    pub tracker: Arc<dyn ErrorTracker>,
}

impl StatusContext {
    pub fn new(
        store: Arc<dyn AnalyzerStatusStore>,
        hierarchy: Arc<dyn HierarchySource>,
        gate: Arc<dyn FeatureGate>,
        tracker: Arc<dyn ErrorTracker>,
    ) -> Self {
        Self {
            store,
            hierarchy,
            gate,
            tracker,
        }
    }

    /// Build a context from a backend that serves as both the status store
    /// and the hierarchy source.
    pub fn from_backend<B>(
        backend: Arc<B>,
        gate: Arc<dyn FeatureGate>,
        tracker: Arc<dyn ErrorTracker>,
    ) -> Self
    where
        B: AnalyzerStatusStore + HierarchySource + 'static,
    {
        Self {
            store: backend.clone(),
            hierarchy: backend,
            gate,
            tracker,
        }
    }
}
