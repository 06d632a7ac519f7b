//! Error types for herd-core

use thiserror::Error;

/// Result type alias using herd-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in herd-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The device state file exists but cannot be trusted. Never
    /// auto-repaired; the cycle aborts and the operator decides.
    #[error("Device state is corrupt: {0}")]
    CorruptState(String),

    /// A registry bind would break the server-id/local-id bijection.
    #[error("Duplicate id mapping: server id {server_id} / local id {local_id} already bound")]
    DuplicateMapping { server_id: String, local_id: String },

    /// Bearer token was rejected by the server.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Network-level failure talking to the coordination server.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("Server returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The host task application adapter failed.
    #[error("Host app error: {0}")]
    HostApp(String),

    /// Sync lock file error
    #[error("Sync lock error: {0}")]
    Lock(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Client-side configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
