//! Periodic settings-based recomputation.
//!
//! Setting changes normally arrive as events. The sweep recomputes every
//! project in pages so statuses converge even when an event was lost.

use std::time::Duration;

use secinv_core::analyzer::AnalyzerType;
use secinv_core::computation::MAX_PROJECT_IDS;
use secinv_core::error::CoreResult;
use secinv_core::types::DbId;
use secinv_pipeline::services::SettingsBasedUpdateService;
use secinv_pipeline::StatusContext;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

/// Settings-backed categories recomputed by the sweep.
pub const SWEPT_CATEGORIES: [AnalyzerType; 2] =
    [AnalyzerType::SecretDetection, AnalyzerType::ContainerScanning];

/// Background service that periodically recomputes setting-based statuses.
pub struct SettingsSweep {
    ctx: StatusContext,
    period: Duration,
}

impl SettingsSweep {
    pub fn new(ctx: StatusContext, period: Duration) -> Self {
        Self { ctx, period }
    }

    /// Sweep every `period` until `cancel` is triggered. The first sweep
    /// runs one period after start.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(interval_secs = self.period.as_secs(), "Settings sweep started");
        let mut interval = interval_at(Instant::now() + self.period, self.period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Settings sweep stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once(&cancel).await {
                        Ok(batches) => tracing::info!(batches, "Settings sweep finished"),
                        Err(e) => tracing::error!(error = %e, "Settings sweep aborted"),
                    }
                }
            }
        }
    }

    /// Page through every project and recompute each swept category.
    ///
    /// A failing batch is logged and skipped. Returns the number of batches
    /// that succeeded; an error listing projects ends the sweep.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> CoreResult<usize> {
        let mut after: DbId = 0;
        let mut succeeded = 0;

        while !cancel.is_cancelled() {
            let page = self
                .ctx
                .hierarchy
                .list_project_ids(after, MAX_PROJECT_IDS)
                .await?;
            let Some(&last) = page.last() else {
                break;
            };

            for analyzer_type in SWEPT_CATEGORIES {
                match SettingsBasedUpdateService::execute(&self.ctx, Some(&page), analyzer_type)
                    .await
                {
                    Ok(_) => succeeded += 1,
                    Err(e) => tracing::error!(
                        error = %e,
                        %analyzer_type,
                        first_project_id = page[0],
                        last_project_id = last,
                        "Settings sweep batch failed"
                    ),
                }
            }
            after = last;
        }
        Ok(succeeded)
    }
}
