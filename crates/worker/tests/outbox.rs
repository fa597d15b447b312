//! Integration tests for the outbox poller.

use std::sync::Arc;
use std::time::Duration;

use secinv_core::analyzer::{AnalyzerType, SecuritySettingField};
use secinv_core::feature_gate::RootAllowList;
use secinv_db::repositories::{
    AnalyzerNamespaceStatusRepo, NamespaceRepo, ProjectRepo, SecuritySettingRepo, StatusEventRepo,
};
use secinv_db::PgAnalyzerStatusStore;
use secinv_events::{AnalyzerEvent, EventPersistence};
use secinv_pipeline::{StatusContext, TracingErrorTracker};
use secinv_worker::{EventDispatcher, OutboxPoller, PollSummary};
use sqlx::PgPool;

fn poller(pool: &PgPool, max_attempts: i32) -> OutboxPoller {
    let ctx = StatusContext::from_backend(
        Arc::new(PgAnalyzerStatusStore::new(pool.clone())),
        Arc::new(RootAllowList::All),
        Arc::new(TracingErrorTracker),
    );
    OutboxPoller::new(
        pool.clone(),
        EventDispatcher::new(ctx),
        10,
        max_attempts,
        Duration::from_millis(50),
    )
}

#[sqlx::test(migrations = "../db/migrations")]
async fn setting_event_is_dispatched_and_marked_processed(pool: PgPool) {
    let root = NamespaceRepo::create(&pool, "root", None).await.unwrap();
    let project = ProjectRepo::create(&pool, "app", root.id).await.unwrap();
    SecuritySettingRepo::upsert(
        &pool,
        project.id,
        SecuritySettingField::SecretPushProtectionEnabled,
        true,
    )
    .await
    .unwrap();

    let event_id = EventPersistence::enqueue(
        &pool,
        &AnalyzerEvent::SecuritySettingChanged {
            project_ids: Some(vec![project.id]),
            analyzer_type: AnalyzerType::SecretDetection,
        },
    )
    .await
    .unwrap();

    let summary = poller(&pool, 5).poll_once().await.unwrap();

    assert_eq!(
        summary,
        PollSummary {
            claimed: 1,
            processed: 1,
            failed: 0
        }
    );
    let event = StatusEventRepo::find_by_id(&pool, event_id).await.unwrap().unwrap();
    assert!(event.processed_at.is_some());

    let counter = AnalyzerNamespaceStatusRepo::find(&pool, root.id, AnalyzerType::SecretDetection)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((counter.success, counter.failure), (1, 0));

    // Nothing left to claim.
    assert_eq!(poller(&pool, 5).poll_once().await.unwrap().claimed, 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn undecodable_payload_is_retried_until_attempts_run_out(pool: PgPool) {
    let event_id = StatusEventRepo::insert(
        &pool,
        "project_archived",
        &serde_json::json!({"event_type": "project_archived"}),
    )
    .await
    .unwrap();
    let poller = poller(&pool, 2);

    for _ in 0..2 {
        let summary = poller.poll_once().await.unwrap();
        assert_eq!(summary.failed, 1);
    }
    assert_eq!(poller.poll_once().await.unwrap().claimed, 0);

    let event = StatusEventRepo::find_by_id(&pool, event_id).await.unwrap().unwrap();
    assert_eq!(event.attempts, 2);
    assert!(event.processed_at.is_none());
    assert!(event.last_error.is_some());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn oversized_setting_event_is_recorded_as_failure(pool: PgPool) {
    StatusEventRepo::insert(
        &pool,
        "security_setting_changed",
        &serde_json::json!({
            "event_type": "security_setting_changed",
            "project_ids": (1..=1001).collect::<Vec<i64>>(),
            "analyzer_type": "secret_detection",
        }),
    )
    .await
    .unwrap();

    let summary = poller(&pool, 5).poll_once().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(StatusEventRepo::count_pending(&pool).await.unwrap(), 1);
}
