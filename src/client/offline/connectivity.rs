//! # Connectivity Oracle
//!
//! Answers "are we online" right before a mutating action. The verdict is
//! never cached: connectivity changes between taps, and a stale "online"
//! only costs one request bounded by the request timeout.

use crate::client::config::Config;
use crate::shared::{Result, TrackError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};

/// Reachability check
#[async_trait]
pub trait ConnectivityOracle: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probes the backend with a cheap GET
///
/// Any HTTP answer counts as online, including error statuses: the server
/// was reached. Only transport failures and timeouts count as offline.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(|e| TrackError::Network(format!("Failed to build probe client: {}", e)))?;

        Ok(Self {
            client,
            url: config.server_url().to_string(),
        })
    }
}

#[async_trait]
impl ConnectivityOracle for HttpProbe {
    async fn is_online(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                tracing::debug!("[SYNC] Probe reached server ({})", response.status());
                true
            }
            Err(e) => {
                tracing::debug!("[SYNC] Probe failed, treating as offline: {}", e);
                false
            }
        }
    }
}

/// Connectivity set explicitly by the host (platform signal or tests)
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityOracle for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
