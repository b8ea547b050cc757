//! Backend stand-in for integration tests
//!
//! Wraps a wiremock server together with a fully wired client that talks to
//! it over HTTP. Connectivity is controlled by the test, not probed.

use crate::common::fixtures::{envelope, operation_json};
use chrono::Utc;
use minetrack::client::local_db::LocalDatabase;
use minetrack::client::offline::StaticConnectivity;
use minetrack::client::{Config, MineTrack};
use minetrack::shared::AppConfig;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Request timeout used by the harness, short enough to exercise timeouts
pub const TEST_TIMEOUT_MS: u64 = 300;

pub struct TestApp {
    pub server: MockServer,
    pub app: MineTrack,
    pub connectivity: Arc<StaticConnectivity>,
}

impl TestApp {
    /// Client over an in-memory database
    pub async fn start(online: bool) -> Self {
        let server = MockServer::start().await;
        let db = LocalDatabase::in_memory().await.unwrap();
        Self::with_database(server, db, online)
    }

    /// Client over an on-disk database, for restart tests
    pub async fn open(server: MockServer, db_path: &Path, online: bool) -> Self {
        let db = LocalDatabase::open(db_path).await.unwrap();
        Self::with_database(server, db, online)
    }

    fn with_database(server: MockServer, db: LocalDatabase, online: bool) -> Self {
        let config = test_config(&server.uri());
        let connectivity = Arc::new(StaticConnectivity::new(online));
        let app = MineTrack::with_parts(config, db, connectivity.clone()).unwrap();
        Self {
            server,
            app,
            connectivity,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.connectivity.set_online(online);
    }

    /// `"METHOD /path"` for every request the backend received, in order
    pub async fn requests(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| format!("{} {}", request.method, request.url.path()))
            .collect()
    }

    /// Accept starts, answering with `server_id`
    pub async fn accept_start(&self, server_id: &str) {
        Mock::given(method("POST"))
            .and(path("/operations/start"))
            .respond_with(ResponseTemplate::new(201).set_body_json(envelope(operation_json(
                server_id,
                "e1",
                "carga",
                Some("m1"),
                Utc::now(),
                None,
            ))))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Accept the stop for `server_id` with a bare `{ success: true }`
    pub async fn accept_stop(&self, server_id: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/operations/{}/stop", server_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .mount(&self.server)
            .await;
    }

    /// Answer `GET /operations/current`
    pub async fn current_is(&self, operation: Option<serde_json::Value>) {
        let data = operation.unwrap_or(serde_json::Value::Null);
        Mock::given(method("GET"))
            .and(path("/operations/current"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(data)))
            .mount(&self.server)
            .await;
    }

    /// Hang on `route` for longer than the request timeout
    pub async fn hang(&self, http_method: &str, route: &str) {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true }))
                    .set_delay(Duration::from_millis(TEST_TIMEOUT_MS * 5)),
            )
            .mount(&self.server)
            .await;
    }

    /// Reject `route` once with `status` and `{ error }`
    pub async fn reject_once(&self, http_method: &str, route: &str, status: u16, error: &str) {
        Mock::given(method(http_method))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "error": error })))
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }
}

pub fn test_config(server_url: &str) -> Config {
    Config::with_builder(
        AppConfig::builder()
            .server_url(server_url)
            .request_timeout_ms(TEST_TIMEOUT_MS)
            .sync_interval_secs(1),
    )
    .unwrap()
}
