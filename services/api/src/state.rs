//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the agent registry and service settings.

use crate::config::Config;
use rehearsal_core::{AgentRegistry, scenario::ScenarioCatalog};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{info, warn};

/// How long shutdown waits for live relay sessions to close their sockets.
pub const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<AgentRegistry>,
    pub scenarios: Arc<dyn ScenarioCatalog>,
    pub config: Arc<Config>,
    /// Root cancellation for the whole server. Every relay session runs
    /// under a child of this token.
    pub shutdown: CancellationToken,
    /// Tracks every upgraded relay session so shutdown can wait for them.
    pub sessions: TaskTracker,
}

impl AppState {
    /// Cancels every relay session and waits until each has closed both of
    /// its sockets. Returns `false` if `limit` elapsed first.
    pub async fn drain_sessions(&self, limit: Duration) -> bool {
        self.shutdown.cancel();
        self.sessions.close();
        info!(live = self.sessions.len(), "Waiting for relay sessions to close...");
        match timeout(limit, self.sessions.wait()).await {
            Ok(()) => {
                info!("All relay sessions closed.");
                true
            }
            Err(_) => {
                warn!(
                    live = self.sessions.len(),
                    "Timed out waiting for relay sessions to close"
                );
                false
            }
        }
    }
}
