//! Error types for the statecast environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Network send failed (buffer full, connection closed, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Target node is unreachable (simulated partition)
    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),

    /// Transport could not be set up (bind/connect failed)
    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Peer speaks a different protocol
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Peer was configured for a different frame size
    #[error("Frame size mismatch: local {local} bytes, remote {remote} bytes")]
    FrameSizeMismatch { local: u64, remote: u64 },
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(node: impl std::fmt::Display) -> Self {
        Self::NodeUnreachable(node.to_string())
    }

    /// Creates a channel setup error.
    pub fn unavailable(msg: impl std::fmt::Display) -> Self {
        Self::ChannelUnavailable(msg.to_string())
    }
}
