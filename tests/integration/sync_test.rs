//! Queue replay and server reconciliation over HTTP

use crate::common::*;
use assert_matches::assert_matches;
use minetrack::client::sync::ActiveSyncOutcome;
use pretty_assertions::assert_eq;

async fn offline_start_and_stop(t: &TestApp) -> String {
    let active = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();
    t.app.tracker().stop(None).await.unwrap();
    active.operation_id().unwrap().to_string()
}

#[tokio::test]
async fn test_transient_failure_halts_and_keeps_queue() {
    let t = TestApp::start(false).await;
    offline_start_and_stop(&t).await;

    t.set_online(true);
    t.reject_once("POST", "/operations/start", 503, "Service unavailable")
        .await;

    let report = t.app.sync_service().force_sync().await.unwrap();
    assert!(report.halted_on.is_some());
    assert_eq!(report.remaining, 2);
    assert_eq!(t.requests().await, vec!["POST /operations/start"]);

    let pending = t.app.database().peek_all().await.unwrap();
    assert_eq!(pending[0].attempt_count, 1);
    assert!(pending[0].error_message.is_some());
    assert_eq!(pending[1].attempt_count, 0);

    let status = t.app.sync_service().status().await.unwrap();
    assert_eq!(status.pending_actions, 2);
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn test_id_mapping_lives_until_its_stop_replays() {
    let t = TestApp::start(false).await;
    let local_id = offline_start_and_stop(&t).await;

    t.set_online(true);
    t.accept_start("srv1").await;
    t.reject_once("POST", "/operations/srv1/stop", 503, "Service unavailable")
        .await;

    let report = t.app.sync_service().force_sync().await.unwrap();
    assert_eq!(report.started, vec![(local_id.clone(), "srv1".to_string())]);
    assert!(report.halted_on.is_some());
    assert_eq!(
        t.app.database().resolve_id(&local_id).await.unwrap(),
        Some("srv1".to_string())
    );

    t.accept_stop("srv1").await;
    let report = t.app.sync_service().force_sync().await.unwrap();
    assert_eq!(report.stopped, vec!["srv1".to_string()]);
    assert!(report.is_clean());
    assert!(t.app.database().id_mappings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_start_drops_its_stop() {
    let t = TestApp::start(false).await;
    let local_id = offline_start_and_stop(&t).await;

    t.set_online(true);
    t.reject_once("POST", "/operations/start", 400, "Unknown equipment")
        .await;

    let report = t.app.sync_service().force_sync().await.unwrap();
    assert_eq!(report.dropped.len(), 2);
    assert!(report.dropped.iter().all(|d| d.operation_ref == local_id));
    assert_eq!(report.remaining, 0);
    assert_eq!(t.requests().await, vec!["POST /operations/start"]);
}

#[tokio::test]
async fn test_rejection_does_not_block_later_operations() {
    let t = TestApp::start(false).await;
    offline_start_and_stop(&t).await;
    let second = offline_start_and_stop(&t).await;

    t.set_online(true);
    t.reject_once("POST", "/operations/start", 400, "Unknown equipment")
        .await;
    t.accept_start("srv2").await;
    t.accept_stop("srv2").await;

    let report = t.app.sync_service().force_sync().await.unwrap();
    assert_eq!(report.dropped.len(), 2);
    assert_eq!(report.started, vec![(second, "srv2".to_string())]);
    assert_eq!(report.stopped, vec!["srv2".to_string()]);
    assert_eq!(
        t.requests().await,
        vec![
            "POST /operations/start",
            "POST /operations/start",
            "POST /operations/srv2/stop"
        ]
    );
}

#[tokio::test]
async fn test_server_operation_wins() {
    let t = TestApp::start(true).await;
    t.current_is(Some(operation_json(
        "srv9",
        "e1",
        "carga",
        Some("m1"),
        at(1, 8),
        None,
    )))
    .await;

    let outcome = t.app.synchronizer().sync_active_operations().await.unwrap();
    assert_eq!(outcome, ActiveSyncOutcome::Adopted("srv9".to_string()));

    let active = t.app.session().active().await.unwrap();
    assert_eq!(active.operation_id(), Some("srv9"));
    assert_eq!(active.start_time, at(1, 8));
    assert_eq!(active.repeat_count, 1);
    // Only the id was sent, so the equipment is a placeholder
    assert_eq!(active.equipment.id, "e1");
    assert_eq!(active.equipment.name, "Equipment");
}

#[tokio::test]
async fn test_server_without_operation_clears_local_state() {
    let t = TestApp::start(true).await;
    t.accept_start("srv1").await;
    t.current_is(None).await;

    t.app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    let outcome = t.app.synchronizer().sync_active_operations().await.unwrap();
    assert_eq!(outcome, ActiveSyncOutcome::Cleared);
    crate::assert_idle!(t.app);
}

#[tokio::test]
async fn test_pull_fails_open() {
    let t = TestApp::start(true).await;
    t.accept_start("srv1").await;
    t.hang("GET", "/operations/current").await;

    t.app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    let outcome = t.app.synchronizer().sync_active_operations().await.unwrap();
    assert_eq!(outcome, ActiveSyncOutcome::Unchanged);
    assert_eq!(
        t.app.session().active().await.unwrap().operation_id(),
        Some("srv1")
    );
}

#[tokio::test]
async fn test_resume_session_flushes_before_pulling() {
    let t = TestApp::start(false).await;
    let active = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();
    assert!(active.operation.is_local);

    t.set_online(true);
    t.accept_start("srv1").await;
    t.current_is(Some(operation_json(
        "srv1",
        "e1",
        "carga",
        Some("m1"),
        at(1, 8),
        None,
    )))
    .await;

    let (report, outcome) = t.app.synchronizer().resume_session().await.unwrap();
    assert_eq!(report.started.len(), 1);
    assert_matches!(outcome, ActiveSyncOutcome::Adopted(id) if id == "srv1");
    assert_eq!(
        t.requests().await,
        vec!["POST /operations/start", "GET /operations/current"]
    );

    let active = t.app.session().active().await.unwrap();
    assert!(!active.operation.is_local);
}

#[tokio::test]
async fn test_resume_session_skips_pull_while_queue_is_blocked() {
    let t = TestApp::start(false).await;
    t.app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    t.set_online(true);
    t.hang("POST", "/operations/start").await;

    let (report, outcome) = t.app.synchronizer().resume_session().await.unwrap();
    assert_eq!(report.remaining, 1);
    assert_eq!(outcome, ActiveSyncOutcome::Unchanged);
    assert!(t.app.session().active().await.unwrap().operation.is_local);
    assert_eq!(t.requests().await, vec!["POST /operations/start"]);
}
