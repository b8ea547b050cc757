//! Authentication session
//!
//! Login and registration against the backend, plus persistence of the token
//! and user record so the session survives a restart. Logging out forgets the
//! operator but keeps the durable queue, so actions recorded offline are
//! still replayed after the next login.

use crate::client::api::HttpApiClient;
use crate::client::local_db::{keys, LocalDatabase};
use crate::client::state::SessionState;
use crate::shared::models::{AuthResponse, User};
use crate::shared::{Result, TrackError};

pub struct AuthManager {
    api: HttpApiClient,
    session: SessionState,
    db: LocalDatabase,
}

impl AuthManager {
    pub fn new(api: HttpApiClient, session: SessionState, db: LocalDatabase) -> Self {
        Self { api, session, db }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let email = required("email", email)?;
        required("password", password)?;

        let AuthResponse { token, user } = self.api.login(email, password).await?;
        tracing::info!("[AUTH] Logged in as {}", user.email);
        self.set_auth(token, user.clone()).await?;
        Ok(user)
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let name = required("name", name)?;
        let email = required("email", email)?;
        required("password", password)?;

        let AuthResponse { token, user } = self.api.register(name, email, password).await?;
        tracing::info!("[AUTH] Registered {}", user.email);
        self.set_auth(token, user.clone()).await?;
        Ok(user)
    }

    /// Persist the token and user and make them current
    pub async fn set_auth(&self, token: String, user: User) -> Result<()> {
        self.db.put_json(keys::AUTH_TOKEN, &token).await?;
        self.db.put_json(keys::USER, &user).await?;
        self.api.set_token(Some(token.clone())).await;
        self.session.set_auth(token, user).await;
        Ok(())
    }

    /// Restore a persisted session
    ///
    /// A token without a readable user record counts as logged out.
    pub async fn check_auth(&self) -> Result<Option<User>> {
        let token: Option<String> = self.db.get_json(keys::AUTH_TOKEN).await?;
        let user: Option<User> = self.db.get_json(keys::USER).await?;

        match (token, user) {
            (Some(token), Some(user)) => {
                tracing::debug!("[AUTH] Restored session for {}", user.email);
                self.api.set_token(Some(token.clone())).await;
                self.session.set_auth(token, user.clone()).await;
                Ok(Some(user))
            }
            _ => Ok(None),
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.db.remove(keys::AUTH_TOKEN).await?;
        self.db.remove(keys::USER).await?;
        self.api.set_token(None).await;
        self.session.clear().await?;
        tracing::info!("[AUTH] Logged out");
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.snapshot().await.is_authenticated()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.session.snapshot().await.user
    }
}

/// Trimmed `value`, or a validation error when nothing is left. Passwords
/// are only checked with this and then sent as typed.
fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TrackError::validation(field, "Please fill in all fields"));
    }
    Ok(value)
}
