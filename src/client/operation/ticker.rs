//! Periodic elapsed-time sampling for the running operation
//!
//! The ticker only reads the session; it never dispatches events, so it can
//! run alongside start/stop without coordination.

use crate::client::operation::machine::format_elapsed;
use crate::client::state::SessionState;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One reading of the running operation's clock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElapsedSample {
    pub operation_id: Option<String>,
    pub elapsed_secs: u64,
    /// `HH:MM:SS`
    pub display: String,
    pub repeat_count: u32,
}

pub struct ElapsedTicker {
    receiver: watch::Receiver<Option<ElapsedSample>>,
    handle: JoinHandle<()>,
}

impl ElapsedTicker {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(1);

    /// Spawn the sampling task on the current runtime
    pub fn spawn(session: SessionState, period: Duration) -> Self {
        let (sender, receiver) = watch::channel(None);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let sample = session.active().await.map(|active| {
                    let elapsed_secs = active.elapsed_secs(Utc::now());
                    ElapsedSample {
                        operation_id: active.operation_id().map(str::to_string),
                        elapsed_secs,
                        display: format_elapsed(elapsed_secs),
                        repeat_count: active.repeat_count,
                    }
                });
                if sender.send(sample).is_err() {
                    break;
                }
            }
        });

        Self { receiver, handle }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ElapsedSample>> {
        self.receiver.clone()
    }

    pub fn latest(&self) -> Option<ElapsedSample> {
        self.receiver.borrow().clone()
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
