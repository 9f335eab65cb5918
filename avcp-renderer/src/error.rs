//! Error types for avcp-renderer

use avcp_api::ApiError;
use thiserror::Error;

use crate::types::ConnectionId;

/// Result type for renderer operations
pub type Result<T> = std::result::Result<T, RendererError>;

/// Errors raised by the renderer layer outside of per-session commands
#[derive(Debug, Error)]
pub enum RendererError {
    /// Configuration rejected by `RendererConfig::validate`
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The renderer has been disposed
    #[error("Renderer {0} has been disposed")]
    Disposed(String),

    /// Transport setup failed (runtime, endpoints)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Background thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Usage errors detected synchronously by session commands
///
/// These are programming errors, not device failures: nothing is sent to the
/// device when one is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A resource does not match the protocol info negotiated for the session
    #[error("resource protocol '{offered}' does not match negotiated protocol '{negotiated}'")]
    ProtocolMismatch { negotiated: String, offered: String },

    /// Several resources were given but the negotiated type is not a playlist
    #[error("{count} resources need a playlist type, but connection {connection_id} negotiated '{negotiated}'")]
    PlaylistRequired {
        connection_id: ConnectionId,
        count: usize,
        negotiated: String,
    },

    /// No playlist builder is configured, or it declined the resources
    #[error("no playlist could be built for {0} resources")]
    PlaylistUnavailable(usize),

    #[error("no media resources supplied")]
    NoResources,
}
