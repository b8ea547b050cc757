//! History listing, grouping and detail edits

use crate::common::*;
use assert_matches::assert_matches;
use chrono::{NaiveDate, Utc};
use minetrack::client::history::OperationHistory;
use minetrack::shared::TrackError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn serve_operations(t: &TestApp) {
    Mock::given(method("GET"))
        .and(path("/operations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            operation_json("op1", "e1", "carga", Some("m1"), at(1, 8), Some(at(1, 9))),
            operation_json("op2", "e1", "carga", Some("m1"), at(2, 8), Some(at(2, 9))),
            operation_json("op3", "t1", "acarreo", Some("m1"), at(2, 10), Some(at(2, 11))),
            operation_json("op4", "e1", "carga", Some("m1"), at(3, 8), None),
        ]))))
        .mount(&t.server)
        .await;
}

#[tokio::test]
async fn test_history_counts_and_groups() {
    let t = TestApp::start(true).await;
    serve_operations(&t).await;

    let history = t.app.history().await.unwrap();
    let ids: Vec<_> = history
        .stopped()
        .iter()
        .filter_map(|op| op.id.clone())
        .collect();
    assert_eq!(ids, vec!["op3", "op2", "op1"]);

    let key = history.stopped()[1].key();
    assert_eq!(history.count_for(&key), 2);

    let days = history.groups_by_day_in(&Utc, None);
    let dates: Vec<_> = days.iter().map(|day| day.date).collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        ]
    );
    assert_eq!(days[0].groups.len(), 2);
    assert_eq!(days[0].groups[0].key.equipment_id, "t1");
}

#[tokio::test]
async fn test_running_operation_hides_its_group() {
    let t = TestApp::start(true).await;
    serve_operations(&t).await;
    t.accept_start("srv1").await;

    let active = t
        .app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    let history = t.app.history().await.unwrap();
    assert_eq!(history.display_count(&active), 3);

    let days = history.groups_by_day_in(&Utc, Some(&active));
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].groups.len(), 1);
    assert_eq!(days[0].groups[0].key.equipment_id, "t1");
}

#[tokio::test]
async fn test_update_details() {
    let t = TestApp::start(true).await;
    serve_operations(&t).await;

    let mut edited = operation_json("op1", "e1", "carga", Some("m1"), at(1, 8), Some(at(1, 9)));
    edited["activityDetails"] = json!("Voladura");
    Mock::given(method("PUT"))
        .and(path("/operations/op1"))
        .and(body_json(json!({ "activityDetails": "Voladura" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(edited)))
        .expect(1)
        .mount(&t.server)
        .await;

    let mut history = t.app.history().await.unwrap();
    let updated = history
        .update_details(t.app.api(), "op1", " Voladura ")
        .await
        .unwrap();
    assert_eq!(updated.activity_details.as_deref(), Some("Voladura"));

    let stored = history
        .stopped()
        .iter()
        .find(|op| op.id.as_deref() == Some("op1"))
        .unwrap();
    assert_eq!(stored.activity_details.as_deref(), Some("Voladura"));
}

#[tokio::test]
async fn test_update_details_rejects_local_operations() {
    let t = TestApp::start(true).await;
    let mut history = OperationHistory::default();
    let result = history
        .update_details(t.app.api(), "local_abc", "Voladura")
        .await;
    assert_matches!(result, Err(TrackError::Validation { .. }));
    assert!(t.requests().await.is_empty());
}
