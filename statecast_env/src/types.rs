//! Common types for the statecast environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a statecast node (one render process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Creates a new random NodeId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a NodeId from raw UUID bytes (as sent in the TCP handshake).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Creates a deterministic NodeId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw UUID bytes.
    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First 8 chars are enough to tell nodes apart in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// One published state frame as it travels between nodes.
///
/// The frame bytes are opaque at this layer; `statecast_core` encodes a whole
/// state record into them. `sequence` is assigned by the publisher and only
/// ever grows, so receivers can discard stale or reordered frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEnvelope {
    /// Publisher-local publish counter
    pub sequence: u64,

    /// Sender's clock at publish time (milliseconds)
    pub timestamp_ms: u64,

    /// Encoded record bytes
    pub frame: Vec<u8>,
}

impl FrameEnvelope {
    /// Size of the fixed header that precedes the frame on a byte stream.
    pub const HEADER_LEN: usize = 16;

    /// Creates a new envelope.
    pub fn new(sequence: u64, timestamp_ms: u64, frame: Vec<u8>) -> Self {
        Self {
            sequence,
            timestamp_ms,
            frame,
        }
    }

    /// Returns the frame size in bytes.
    pub fn size(&self) -> usize {
        self.frame.len()
    }

    /// Writes the stream header (`sequence`, `timestamp_ms`, both little endian).
    pub fn header_bytes(&self) -> [u8; Self::HEADER_LEN] {
        let mut header = [0u8; Self::HEADER_LEN];
        header[0..8].copy_from_slice(&self.sequence.to_le_bytes());
        header[8..16].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        header
    }

    /// Parses a stream header into `(sequence, timestamp_ms)`.
    pub fn parse_header(header: &[u8; Self::HEADER_LEN]) -> (u64, u64) {
        let mut sequence = [0u8; 8];
        let mut timestamp = [0u8; 8];
        sequence.copy_from_slice(&header[0..8]);
        timestamp.copy_from_slice(&header[8..16]);
        (u64::from_le_bytes(sequence), u64::from_le_bytes(timestamp))
    }
}
