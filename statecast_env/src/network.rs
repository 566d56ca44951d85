//! Network transport abstraction for statecast nodes.

use async_trait::async_trait;
use crate::error::EnvError;
use crate::types::{FrameEnvelope, NodeId};

/// Abstraction for frame delivery between a producer and its consumers.
///
/// # Implementations
///
/// - **Production**: `TcpTransport` (one stream per consumer)
/// - **Simulation**: channel-based with configurable latency/loss
///
/// # Frame Flow
///
/// ```text
/// Producer                   Network                  Consumer
///   |                           |                         |
///   |-- broadcast(frame) ------>|                         |
///   |                           |-- [latency/loss] ------>|
///   |                           |                         |-- try_recv() -> frame
/// ```
///
/// Delivery is best effort. Nothing is acknowledged or retransmitted; the
/// next tick's frame supersedes a lost one.
#[async_trait]
pub trait NetworkTransport: Send + Sync + 'static {
    /// Sends a frame to a single node.
    ///
    /// # Returns
    /// * `Ok(())` - Frame queued for delivery
    /// * `Err(EnvError::NetworkError)` - Immediate send failure (e.g., buffer full)
    ///
    /// # Note
    /// Success does not guarantee delivery.
    async fn send(&self, target: NodeId, frame: FrameEnvelope) -> Result<(), EnvError>;

    /// Broadcasts a frame to every connected node.
    ///
    /// # Returns
    /// Number of nodes the frame was handed to.
    async fn broadcast(&self, frame: FrameEnvelope) -> usize;

    /// Returns the next frame that has already arrived, if any.
    ///
    /// Never waits. Callers poll this once per render tick.
    fn try_recv(&self) -> Option<(NodeId, FrameEnvelope)>;

    /// Returns this node's ID.
    fn local_id(&self) -> NodeId;
}

/// Fault injection for simulated networks.
pub trait NetworkController: Send + Sync {
    /// Creates a network partition between two node sets.
    fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]);

    /// Heals all partitions.
    fn heal_all(&self);

    /// Sets latency for a specific link.
    fn set_link_latency(&self, from: NodeId, to: NodeId, latency_ms: u64);

    /// Sets packet loss probability for a link (0.0 - 1.0).
    fn set_link_loss(&self, from: NodeId, to: NodeId, loss_rate: f64);
}
