//! Login, persisted session and logout

use crate::common::*;
use assert_matches::assert_matches;
use minetrack::shared::TrackError;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn accept_login(t: &TestApp) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "ana@example.com", "password": "secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-1",
            "user": { "_id": "u1", "name": "Ana", "email": "ana@example.com" }
        })))
        .mount(&t.server)
        .await;
}

#[tokio::test]
async fn test_login_sets_bearer_token_and_resumes() {
    let t = TestApp::start(true).await;
    accept_login(&t).await;
    Mock::given(method("GET"))
        .and(path("/operations/current"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!(null))))
        .expect(1)
        .mount(&t.server)
        .await;

    let user = t.app.login(" ana@example.com ", "secret").await.unwrap();
    assert_eq!(user, operator());
    assert!(t.app.auth().is_authenticated().await);
    assert!(t.app.api().has_token().await);
    assert_eq!(
        t.requests().await,
        vec!["POST /auth/login", "GET /operations/current"]
    );
}

#[tokio::test]
async fn test_login_sends_password_as_typed() {
    let t = TestApp::start(false).await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({ "email": "ana@example.com", "password": " pass word " })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-1",
            "user": { "_id": "u1", "name": "Ana", "email": "ana@example.com" }
        })))
        .expect(1)
        .mount(&t.server)
        .await;

    let user = t
        .app
        .auth()
        .login(" ana@example.com", " pass word ")
        .await
        .unwrap();
    assert_eq!(user, operator());

    let blank = t.app.auth().login("ana@example.com", "   ").await;
    assert_matches!(blank, Err(TrackError::Validation { .. }));
}

#[tokio::test]
async fn test_login_error_message_comes_from_backend() {
    let t = TestApp::start(true).await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid credentials" })),
        )
        .mount(&t.server)
        .await;

    let result = t.app.login("ana@example.com", "wrong").await;
    assert_matches!(
        result,
        Err(TrackError::ServerRejected { status: 401, message }) if message == "Invalid credentials"
    );
    assert!(!t.app.auth().is_authenticated().await);
}

#[tokio::test]
async fn test_register_requires_every_field() {
    let t = TestApp::start(true).await;
    let result = t.app.auth().register("", "ana@example.com", "secret").await;
    assert_matches!(result, Err(TrackError::Validation { field, .. }) if field == "name");
    assert!(t.requests().await.is_empty());
}

#[tokio::test]
async fn test_logout_keeps_queued_actions() {
    let t = TestApp::start(true).await;
    accept_login(&t).await;
    t.current_is(None).await;
    t.app.login("ana@example.com", "secret").await.unwrap();

    t.set_online(false);
    t.app
        .tracker()
        .start(&excavator(), &carga(), &with_material("m1"))
        .await
        .unwrap();

    t.app.auth().logout().await.unwrap();

    assert!(!t.app.auth().is_authenticated().await);
    assert!(!t.app.api().has_token().await);
    crate::assert_idle!(t.app);
    assert_eq!(t.app.auth().check_auth().await.unwrap(), None);
    crate::assert_pending!(t.app, 1);
}
