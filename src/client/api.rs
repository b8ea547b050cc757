//! REST client for the operations backend
//!
//! Every call carries the bearer token (when one is set) and is bounded by the
//! configured request timeout. A timeout surfaces as [`TrackError::Timeout`],
//! distinct from transport failures and from 4xx/5xx answers, so callers can
//! decide whether to queue the action locally.
//!
//! The tracker and synchronizer depend on the [`RemoteOperationService`] and
//! [`ReferenceDataSource`] traits rather than on [`HttpApiClient`] directly.

use crate::client::config::Config;
use crate::shared::models::{
    Activity, AuthResponse, Equipment, ErrorBody, LoginRequest, Material, Operation,
    RegisterRequest, StartOperationRequest, StopOperationRequest, UpdateOperationRequest,
};
use crate::shared::{Result, TrackError};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The backend's operation endpoints
#[async_trait]
pub trait RemoteOperationService: Send + Sync {
    /// `POST /operations/start`
    async fn start_operation(&self, request: &StartOperationRequest) -> Result<Operation>;

    /// `POST /operations/:id/stop`; the backend may omit the closed record
    async fn stop_operation(
        &self,
        operation_id: &str,
        request: &StopOperationRequest,
    ) -> Result<Option<Operation>>;

    /// `GET /operations/current`
    async fn current_operation(&self) -> Result<Option<Operation>>;

    /// `GET /operations`
    async fn list_operations(&self) -> Result<Vec<Operation>>;

    /// `PUT /operations/:id`
    async fn update_operation(
        &self,
        operation_id: &str,
        request: &UpdateOperationRequest,
    ) -> Result<Operation>;
}

/// Read-only lookup lists
#[async_trait]
pub trait ReferenceDataSource: Send + Sync {
    async fn fetch_activities(&self) -> Result<Vec<Activity>>;
    async fn fetch_materials(&self) -> Result<Vec<Material>>;
    async fn fetch_equipment(&self) -> Result<Vec<Equipment>>;
}

/// HTTP implementation of the backend traits
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    config: Config,
    client: Client,
    token: Arc<RwLock<Option<String>>>,
}

impl HttpApiClient {
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TrackError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the bearer token used for subsequent calls
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// `POST /auth/login`
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.send(Method::POST, "/auth/login", Some(&request)).await
    }

    /// `POST /auth/register`
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let request = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.send(Method::POST, "/auth/register", Some(&request))
            .await
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.config.api_url(path));
        match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and decode the payload, unwrapping `{ success, data }`
    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        match self.send_raw(method, path, body).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                TrackError::InvalidResponse(format!("Unexpected payload from {}: {}", path, e))
            }),
            None => Err(TrackError::InvalidResponse(format!(
                "Empty payload from {}",
                path
            ))),
        }
    }

    /// Like [`send`](Self::send) but an absent or null payload is `None`
    async fn send_optional<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Option<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        match self.send_raw(method, path, body).await? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                TrackError::InvalidResponse(format!("Unexpected payload from {}: {}", path, e))
            }),
            None => Ok(None),
        }
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.send_optional::<(), T>(Method::GET, path, None).await
    }

    async fn send_raw<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Option<Value>>
    where
        B: Serialize + ?Sized + Sync,
    {
        let mut builder = self.request(method.clone(), path).await;
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.transport_error(&method, path, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&method, path, e))?;

        if !status.is_success() {
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let message = body
                .error
                .or(body.message)
                .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
            tracing::warn!("[API] {} {} failed with {}: {}", method, path, status, message);
            return Err(TrackError::from_status(status.as_u16(), message));
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            TrackError::InvalidResponse(format!("Malformed JSON from {}: {}", path, e))
        })?;

        tracing::debug!("[API] {} {} -> {}", method, path, status);
        unwrap_envelope(value)
    }

    fn transport_error(&self, method: &Method, path: &str, error: reqwest::Error) -> TrackError {
        if error.is_timeout() {
            let timeout_ms = self.config.request_timeout().as_millis() as u64;
            tracing::warn!("[API] {} {} timed out after {} ms", method, path, timeout_ms);
            TrackError::Timeout { timeout_ms }
        } else {
            tracing::warn!("[API] {} {} network error: {}", method, path, error);
            TrackError::Network(error.to_string())
        }
    }
}

/// Take `data` out of a `{ success, data, error }` envelope
///
/// Bodies without an envelope (the auth endpoints) pass through untouched.
fn unwrap_envelope(value: Value) -> Result<Option<Value>> {
    let Value::Object(mut map) = value else {
        return Ok(Some(value));
    };

    if map.get("success") == Some(&Value::Bool(false)) {
        let message = map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Request was not successful")
            .to_string();
        return Err(TrackError::InvalidResponse(message));
    }

    match map.remove("data") {
        Some(Value::Null) => Ok(None),
        Some(data) => Ok(Some(data)),
        None if map.contains_key("success") => Ok(None),
        None => Ok(Some(Value::Object(map))),
    }
}

#[async_trait]
impl RemoteOperationService for HttpApiClient {
    async fn start_operation(&self, request: &StartOperationRequest) -> Result<Operation> {
        self.send(Method::POST, "/operations/start", Some(request))
            .await
    }

    async fn stop_operation(
        &self,
        operation_id: &str,
        request: &StopOperationRequest,
    ) -> Result<Option<Operation>> {
        let path = format!("/operations/{}/stop", operation_id);
        self.send_optional(Method::POST, &path, Some(request)).await
    }

    async fn current_operation(&self) -> Result<Option<Operation>> {
        self.get_optional("/operations/current").await
    }

    async fn list_operations(&self) -> Result<Vec<Operation>> {
        Ok(self.get_optional("/operations").await?.unwrap_or_default())
    }

    async fn update_operation(
        &self,
        operation_id: &str,
        request: &UpdateOperationRequest,
    ) -> Result<Operation> {
        let path = format!("/operations/{}", operation_id);
        self.send(Method::PUT, &path, Some(request)).await
    }
}

#[async_trait]
impl ReferenceDataSource for HttpApiClient {
    async fn fetch_activities(&self) -> Result<Vec<Activity>> {
        Ok(self.get_optional("/activities").await?.unwrap_or_default())
    }

    async fn fetch_materials(&self) -> Result<Vec<Material>> {
        Ok(self.get_optional("/materials").await?.unwrap_or_default())
    }

    async fn fetch_equipment(&self) -> Result<Vec<Equipment>> {
        Ok(self.get_optional("/equipment").await?.unwrap_or_default())
    }
}
