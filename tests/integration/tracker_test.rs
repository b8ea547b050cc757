//! Operation lifecycle against the HTTP backend
//!
//! Start, stop and repeat through the tracker, online and offline.

use crate::common::*;
use assert_matches::assert_matches;
use minetrack::client::operation::{RepeatOutcome, StopOutcome};
use minetrack::shared::models::{is_local_id, Operation};
use minetrack::shared::TrackError;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn reference_operation(id: &str) -> Operation {
    serde_json::from_value(operation_json(
        id,
        "e1",
        "carga",
        Some("m1"),
        at(1, 8),
        Some(at(1, 9)),
    ))
    .unwrap()
}

#[tokio::test]
async fn test_online_start_and_stop() {
    let t = TestApp::start(true).await;
    t.accept_start("srv1").await;
    t.accept_stop("srv1").await;

    let active = crate::assert_ok!(
        t.app
            .tracker()
            .start(&excavator(), &carga(), &with_material("m1"))
            .await
    );
    assert_eq!(active.operation_id(), Some("srv1"));
    assert_eq!(active.repeat_count, 1);
    assert!(!active.operation.is_local);

    let outcome = t.app.tracker().stop(None).await.unwrap();
    assert_matches!(&outcome, StopOutcome::Stopped { operation_id, .. } if operation_id == "srv1");
    crate::assert_idle!(t.app);

    // The same operation comes back closed
    let stopped = outcome.operation();
    assert_eq!(stopped.id.as_deref(), Some("srv1"));
    assert_eq!(stopped.equipment.id(), "e1");
    assert_eq!(stopped.activity.id(), "carga");
    assert_eq!(stopped.material.as_ref().map(|m| m.id()), Some("m1"));
    assert_eq!(stopped.start_time, active.operation.start_time);
    let end_time = stopped.end_time.expect("stopped operation has an end time");
    assert!(end_time >= stopped.start_time);

    assert_eq!(
        t.requests().await,
        vec!["POST /operations/start", "POST /operations/srv1/stop"]
    );
}

#[tokio::test]
async fn test_stop_keeps_server_end_time() {
    let t = TestApp::start(true).await;
    t.accept_start("srv1").await;
    let start = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap()
        .operation
        .start_time;
    let server_end = start + chrono::Duration::minutes(42);
    Mock::given(method("POST"))
        .and(path("/operations/srv1/stop"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(operation_json(
            "srv1",
            "e1",
            "carga",
            Some("m1"),
            start,
            Some(server_end),
        ))))
        .mount(&t.server)
        .await;

    let outcome = t.app.tracker().stop(None).await.unwrap();
    assert_eq!(outcome.operation().end_time, Some(server_end));
    assert_eq!(t.app.session().session_total_secs().await, 42 * 60);
}

#[tokio::test]
async fn test_offline_start_and_stop_replay_in_order() {
    let t = TestApp::start(false).await;

    let active = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();
    let local_id = active.operation_id().unwrap().to_string();
    assert!(is_local_id(&local_id));
    assert!(active.operation.is_local);
    assert_eq!(active.operation.material.as_ref().map(|m| m.id()), Some("m1"));

    let outcome = t.app.tracker().stop(Some(1.5)).await.unwrap();
    assert_matches!(&outcome, StopOutcome::Queued { operation_id, .. } if *operation_id == local_id);
    assert!(outcome.operation().is_stopped());
    assert_eq!(outcome.operation().distance, Some(1.5));
    crate::assert_pending!(t.app, 2);
    assert!(t.requests().await.is_empty());

    t.set_online(true);
    t.accept_start("srv1").await;
    t.accept_stop("srv1").await;

    let report = t.app.sync_service().force_sync().await.unwrap();
    assert_eq!(report.started, vec![(local_id, "srv1".to_string())]);
    assert_eq!(report.stopped, vec!["srv1".to_string()]);
    assert!(report.is_clean());

    assert_eq!(
        t.requests().await,
        vec!["POST /operations/start", "POST /operations/srv1/stop"]
    );

    let requests = t.server.received_requests().await.unwrap();
    let start_body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        start_body,
        json!({ "equipment": "e1", "activity": "carga", "material": "m1" })
    );
    let stop_body: Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(stop_body, json!({ "distance": 1.5 }));
}

#[tokio::test]
async fn test_online_stop_of_offline_start_flushes_first() {
    let t = TestApp::start(false).await;
    let active = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();
    assert!(active.operation.is_local_only());

    t.set_online(true);
    t.accept_start("srv1").await;
    t.accept_stop("srv1").await;

    let outcome = t.app.tracker().stop(None).await.unwrap();
    assert_matches!(&outcome, StopOutcome::Stopped { operation_id, .. } if operation_id == "srv1");
    assert!(!outcome.operation().is_local);
    assert!(outcome.operation().is_stopped());
    crate::assert_pending!(t.app, 0);
    assert_eq!(
        t.requests().await,
        vec!["POST /operations/start", "POST /operations/srv1/stop"]
    );
}

#[tokio::test]
async fn test_single_active_operation() {
    let t = TestApp::start(true).await;
    t.accept_start("srv1").await;
    let tracker = t.app.tracker();

    tracker
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    let again = tracker
        .start(&excavator(), &carga(), &with_material("m1"))
        .await;
    assert_matches!(again, Err(TrackError::Conflict(message)) if message.contains("stop it first"));

    let other = tracker
        .start(&truck(), &acarreo(), &with_material("m1"))
        .await;
    assert_matches!(other, Err(TrackError::Conflict(message)) if message.contains("switching equipment"));

    assert_eq!(
        t.app.session().active().await.unwrap().operation_id(),
        Some("srv1")
    );
    assert_eq!(t.requests().await, vec!["POST /operations/start"]);
}

#[tokio::test]
async fn test_invalid_form_never_reaches_the_server() {
    let t = TestApp::start(true).await;
    let tracker = t.app.tracker();

    let missing_material = tracker
        .start(&excavator(), &carga(), &Default::default())
        .await;
    assert_matches!(missing_material, Err(TrackError::Validation { field, .. }) if field == "material");

    let wrong_category = tracker
        .start(&truck(), &carga(), &with_material("m1"))
        .await;
    assert_matches!(wrong_category, Err(TrackError::Validation { field, .. }) if field == "activity");

    let missing_reason = tracker
        .start(&excavator(), &espera(), &Default::default())
        .await;
    assert_matches!(missing_reason, Err(TrackError::Validation { field, .. }) if field == "activityDetails");

    crate::assert_idle!(t.app);
    assert!(t.requests().await.is_empty());
}

#[tokio::test]
async fn test_stop_without_active_operation() {
    let t = TestApp::start(true).await;
    let result = t.app.tracker().stop(None).await;
    assert_matches!(result, Err(TrackError::NotActive(_)));
    assert!(t.requests().await.is_empty());
}

#[tokio::test]
async fn test_timeout_fails_then_next_start_queues() {
    let t = TestApp::start(true).await;
    t.hang("POST", "/operations/start").await;

    let first = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await;
    assert_matches!(first, Err(TrackError::Timeout { timeout_ms }) if timeout_ms == TEST_TIMEOUT_MS);
    crate::assert_idle!(t.app);
    crate::assert_pending!(t.app, 0);

    let second = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();
    assert!(second.operation.is_local);
    crate::assert_pending!(t.app, 1);
    assert_eq!(t.requests().await, vec!["POST /operations/start"]);
}

#[tokio::test]
async fn test_stop_timeout_keeps_operation_then_queues() {
    let t = TestApp::start(true).await;
    t.accept_start("srv1").await;
    t.hang("POST", "/operations/srv1/stop").await;
    let tracker = t.app.tracker();

    tracker
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    let first = tracker.stop(None).await;
    assert_matches!(first, Err(TrackError::Timeout { .. }));
    assert_eq!(
        t.app.session().active().await.unwrap().operation_id(),
        Some("srv1")
    );

    let second = tracker.stop(None).await.unwrap();
    assert_matches!(&second, StopOutcome::Queued { operation_id, .. } if operation_id == "srv1");
    assert!(second.operation().is_stopped());
    crate::assert_idle!(t.app);
    crate::assert_pending!(t.app, 1);
}

#[tokio::test]
async fn test_rejection_does_not_switch_to_queue() {
    let t = TestApp::start(true).await;
    t.reject_once("POST", "/operations/start", 400, "Equipment is busy")
        .await;
    t.accept_start("srv2").await;

    let first = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await;
    assert_matches!(
        first,
        Err(TrackError::ServerRejected { status: 400, message }) if message == "Equipment is busy"
    );

    let second = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();
    assert_eq!(second.operation_id(), Some("srv2"));
    crate::assert_pending!(t.app, 0);
}

#[tokio::test]
async fn test_stop_discards_operation_whose_start_was_rejected() {
    let t = TestApp::start(false).await;
    let active = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();
    let local_id = active.operation_id().unwrap().to_string();

    t.set_online(true);
    t.reject_once("POST", "/operations/start", 422, "Invalid material")
        .await;

    let outcome = t.app.tracker().stop(None).await.unwrap();
    assert_matches!(
        &outcome,
        StopOutcome::RemovedLocally { operation_id, .. } if *operation_id == local_id
    );
    assert!(outcome.operation().end_time.is_some());
    crate::assert_idle!(t.app);
    assert_eq!(t.requests().await, vec!["POST /operations/start"]);
}

#[tokio::test]
async fn test_repeat_increments_matching_operation() {
    let t = TestApp::start(true).await;
    t.accept_start("srv1").await;
    let tracker = t.app.tracker();

    tracker
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    let reference = reference_operation("old1");
    assert_eq!(
        tracker.repeat_with_same_parameters(&reference).await.unwrap(),
        RepeatOutcome::Incremented { repeat_count: 2 }
    );
    assert_eq!(
        tracker.repeat_with_same_parameters(&reference).await.unwrap(),
        RepeatOutcome::Incremented { repeat_count: 3 }
    );
    assert_eq!(tracker.increment_repeat_count("other").await.unwrap(), None);
    assert_eq!(t.requests().await, vec!["POST /operations/start"]);
}

#[tokio::test]
async fn test_repeat_while_idle_starts_new_operation() {
    let t = TestApp::start(true).await;
    t.accept_start("srv2").await;

    let outcome = t
        .app
        .tracker()
        .repeat_with_same_parameters(&reference_operation("old1"))
        .await
        .unwrap();

    let RepeatOutcome::Started(active) = outcome else {
        panic!("expected a new operation, got {:?}", outcome);
    };
    assert_eq!(active.operation_id(), Some("srv2"));
    assert_eq!(active.repeat_count, 1);
    assert_eq!(active.equipment.id, "e1");

    let requests = t.server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body,
        json!({ "equipment": "e1", "activity": "carga", "material": "m1" })
    );
}
