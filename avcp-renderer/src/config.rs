//! Configuration for renderers, the registry and the SOAP transport

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RendererError, Result};
use crate::renderer::PlaylistBuilder;

/// Configuration shared by every renderer in a registry
#[derive(Clone)]
pub struct RendererConfig {
    /// How long an event-reported connection id waits for an in-flight
    /// negotiation before it is fetched explicitly
    /// Default: 30 seconds
    pub deferred_reconciliation_timeout: Duration,

    /// Interval of the position poller
    /// Default: 1 second
    pub poll_interval: Duration,

    /// Timeout requested for GENA subscriptions
    /// Default: 1800 seconds (30 minutes)
    pub subscription_timeout: Duration,

    /// How long a new subscription waits for its initial event before it is
    /// reported as established anyway
    /// Default: 5 seconds
    pub initial_event_timeout: Duration,

    /// `PeerConnectionManager` sent with PrepareForConnection
    /// Default: "/"
    pub peer_connection_manager: String,

    /// Combines several items into one transportable resource
    /// Default: none
    pub playlist_builder: Option<Arc<dyn PlaylistBuilder>>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            deferred_reconciliation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            subscription_timeout: Duration::from_secs(1800),
            initial_event_timeout: Duration::from_secs(5),
            peer_connection_manager: "/".to_string(),
            playlist_builder: None,
        }
    }
}

impl fmt::Debug for RendererConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererConfig")
            .field("deferred_reconciliation_timeout", &self.deferred_reconciliation_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("subscription_timeout", &self.subscription_timeout)
            .field("initial_event_timeout", &self.initial_event_timeout)
            .field("peer_connection_manager", &self.peer_connection_manager)
            .field("playlist_builder", &self.playlist_builder.is_some())
            .finish()
    }
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return the first issue found
    pub fn validate(&self) -> Result<()> {
        if self.deferred_reconciliation_timeout == Duration::ZERO {
            return Err(RendererError::InvalidConfig(
                "Deferred reconciliation timeout must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval == Duration::ZERO {
            return Err(RendererError::InvalidConfig(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.subscription_timeout.as_secs() == 0 || self.subscription_timeout.as_secs() > u64::from(u32::MAX) {
            return Err(RendererError::InvalidConfig(
                "Subscription timeout must be between 1 second and u32::MAX seconds".to_string(),
            ));
        }

        if self.peer_connection_manager.trim().is_empty() {
            return Err(RendererError::InvalidConfig(
                "Peer connection manager must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_deferred_reconciliation_timeout(mut self, timeout: Duration) -> Self {
        self.deferred_reconciliation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn with_initial_event_timeout(mut self, timeout: Duration) -> Self {
        self.initial_event_timeout = timeout;
        self
    }

    pub fn with_peer_connection_manager(mut self, peer: impl Into<String>) -> Self {
        self.peer_connection_manager = peer.into();
        self
    }

    pub fn with_playlist_builder(mut self, builder: Arc<dyn PlaylistBuilder>) -> Self {
        self.playlist_builder = Some(builder);
        self
    }
}
