//! Operation Tracking Client
//!
//! The offline-tolerant core of the tracker: the REST client, the local
//! database, the operation lifecycle and the sync machinery around it.
//!
//! # Architecture
//!
//! - **`config`** - Server URL, timeouts and token
//! - **`api`** - REST client and the backend traits
//! - **`auth`** - Login, registration and the persisted session
//! - **`local_db`** - SQLite queue, id mappings and key/value store
//! - **`offline`** - Connectivity oracle and reference data cache
//! - **`operation`** - Lifecycle state machine, tracker and elapsed ticker
//! - **`state`** - Session state shared by everything above
//! - **`sync`** - Queue replay, server reconciliation and the background loop
//! - **`history`** - Stopped operations, repetition counts and day groups
//!
//! # Example
//!
//! ```rust,no_run
//! use minetrack::client::{Config, MineTrack};
//!
//! # async fn example() -> minetrack::shared::Result<()> {
//! let app = MineTrack::open(Config::new()).await?;
//! if app.startup().await?.is_some() {
//!     let status = app.sync_service().status().await?;
//!     println!("{} actions pending", status.pending_actions);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod history;
pub mod local_db;
pub mod offline;
pub mod operation;
pub mod state;
pub mod sync;

pub use api::{HttpApiClient, ReferenceDataSource, RemoteOperationService};
pub use auth::AuthManager;
pub use config::Config;
pub use history::{DayGroup, OperationGroup, OperationHistory};
pub use local_db::LocalDatabase;
pub use offline::{ConnectivityOracle, HttpProbe, ReferenceDataCache, StaticConnectivity};
pub use operation::{ActiveOperationState, OperationTracker};
pub use state::{AppState, SessionState};
pub use sync::{OperationSynchronizer, SyncService};

use crate::shared::models::User;
use crate::shared::Result;
use std::sync::Arc;

/// Every client component wired over one database and one API client
pub struct MineTrack {
    config: Config,
    db: LocalDatabase,
    api: HttpApiClient,
    connectivity: Arc<dyn ConnectivityOracle>,
    session: SessionState,
    synchronizer: Arc<OperationSynchronizer>,
    tracker: OperationTracker,
    reference: ReferenceDataCache,
    auth: AuthManager,
    sync_service: SyncService,
}

impl MineTrack {
    /// Open the on-disk database and probe connectivity over HTTP
    pub async fn open(config: Config) -> Result<Self> {
        let db = LocalDatabase::open(config.database_path()).await?;
        let probe = HttpProbe::new(&config)?;
        Self::with_parts(config, db, Arc::new(probe))
    }

    /// Assemble the client over an existing database and oracle
    pub fn with_parts(
        config: Config,
        db: LocalDatabase,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Result<Self> {
        let api = HttpApiClient::new(config.clone())?;
        let remote: Arc<dyn RemoteOperationService> = Arc::new(api.clone());
        let session = SessionState::new(db.clone());

        let synchronizer = Arc::new(OperationSynchronizer::new(
            db.clone(),
            Arc::clone(&remote),
            session.clone(),
        ));
        let tracker = OperationTracker::new(
            session.clone(),
            Arc::clone(&synchronizer),
            remote,
            Arc::clone(&connectivity),
            db.clone(),
        );
        let reference = ReferenceDataCache::new(Arc::new(api.clone()), db.clone());
        let auth = AuthManager::new(api.clone(), session.clone(), db.clone());
        let sync_service = SyncService::new(
            Arc::clone(&synchronizer),
            Arc::clone(&connectivity),
            config.sync_interval(),
        );

        Ok(Self {
            config,
            db,
            api,
            connectivity,
            session,
            synchronizer,
            tracker,
            reference,
            auth,
            sync_service,
        })
    }

    /// Restore the persisted session and reconcile it with the server
    ///
    /// Returns the logged-in user, if any. The checkpointed operation is
    /// restored first; when online, the queue is flushed and the server's
    /// current operation is pulled.
    pub async fn startup(&self) -> Result<Option<User>> {
        let user = self.auth.check_auth().await?;
        self.tracker.restore_session().await?;

        if user.is_some() && self.connectivity.is_online().await {
            let (report, outcome) = self.synchronizer.resume_session().await?;
            tracing::info!(
                "[SYNC] Resumed session: {} synced, {} remaining, active {:?}",
                report.synced(),
                report.remaining,
                outcome
            );
        }
        Ok(user)
    }

    /// Reconcile right after a successful login
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let user = self.auth.login(email, password).await?;
        self.synchronizer.resume_session().await?;
        Ok(user)
    }

    pub async fn history(&self) -> Result<OperationHistory> {
        OperationHistory::fetch(&self.api).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }

    pub fn api(&self) -> &HttpApiClient {
        &self.api
    }

    pub fn connectivity(&self) -> &Arc<dyn ConnectivityOracle> {
        &self.connectivity
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn synchronizer(&self) -> &Arc<OperationSynchronizer> {
        &self.synchronizer
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn reference_data(&self) -> &ReferenceDataCache {
        &self.reference
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn sync_service(&self) -> &SyncService {
        &self.sync_service
    }

    pub fn sync_service_mut(&mut self) -> &mut SyncService {
        &mut self.sync_service
    }
}
