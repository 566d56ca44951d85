//! Simulated network transport with fault injection.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use statecast_env::{EnvError, FrameEnvelope, NetworkController, NetworkTransport, NodeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Simulated network interface for one node.
///
/// Outgoing frames go to the world's router; incoming frames are queued by
/// the router once their simulated delay has elapsed.
pub struct SimNetwork {
    /// This node's ID
    local_id: NodeId,

    /// Every node of the session (including this one)
    peers: Vec<NodeId>,

    /// Sender to central router
    tx: mpsc::Sender<NetworkMessage>,

    /// Frames delivered to this node
    rx: Mutex<mpsc::Receiver<(NodeId, FrameEnvelope)>>,
}

/// Internal message to the network router.
#[derive(Debug)]
pub struct NetworkMessage {
    pub from: NodeId,
    pub to: NodeId,
    pub frame: FrameEnvelope,
}

impl SimNetwork {
    pub fn new(
        local_id: NodeId,
        peers: Vec<NodeId>,
        tx: mpsc::Sender<NetworkMessage>,
        rx: mpsc::Receiver<(NodeId, FrameEnvelope)>,
    ) -> Self {
        Self {
            local_id,
            peers,
            tx,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl NetworkTransport for SimNetwork {
    async fn send(&self, target: NodeId, frame: FrameEnvelope) -> Result<(), EnvError> {
        if !self.peers.contains(&target) {
            return Err(EnvError::unreachable(target));
        }
        let msg = NetworkMessage {
            from: self.local_id,
            to: target,
            frame,
        };
        self.tx
            .send(msg)
            .await
            .map_err(|_| EnvError::network("Router channel closed"))
    }

    async fn broadcast(&self, frame: FrameEnvelope) -> usize {
        let mut sent = 0;
        for &peer in self.peers.iter().filter(|&&p| p != self.local_id) {
            if self.send(peer, frame.clone()).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }

    fn try_recv(&self) -> Option<(NodeId, FrameEnvelope)> {
        self.rx.lock().ok()?.try_recv().ok()
    }

    fn local_id(&self) -> NodeId {
        self.local_id
    }
}

/// Fault model applied by the router to every message.
pub struct SimNetworkController {
    /// Per-link latency in milliseconds
    link_latency: Mutex<HashMap<(NodeId, NodeId), u64>>,

    /// Per-link packet loss rate (0.0 - 1.0)
    link_loss: Mutex<HashMap<(NodeId, NodeId), f64>>,

    /// Active partitions (nodes that cannot communicate)
    partitions: Mutex<Vec<(Vec<NodeId>, Vec<NodeId>)>>,

    /// Standard deviation of the latency jitter in milliseconds
    jitter_std_ms: Mutex<f64>,

    /// Seeded RNG for loss and jitter draws
    rng: Mutex<ChaCha8Rng>,
}

impl SimNetworkController {
    pub fn new(seed: u64) -> Self {
        Self {
            link_latency: Mutex::new(HashMap::new()),
            link_loss: Mutex::new(HashMap::new()),
            partitions: Mutex::new(Vec::new()),
            jitter_std_ms: Mutex::new(0.0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Sets the latency jitter applied to every link.
    pub fn set_jitter(&self, std_ms: f64) {
        if let Ok(mut jitter) = self.jitter_std_ms.lock() {
            *jitter = std_ms.max(0.0);
        }
    }

    /// Removes latency, jitter, loss and partitions.
    pub fn clear_faults(&self) {
        self.heal_all();
        if let Ok(mut latencies) = self.link_latency.lock() {
            latencies.clear();
        }
        if let Ok(mut losses) = self.link_loss.lock() {
            losses.clear();
        }
        self.set_jitter(0.0);
    }

    /// Checks if two nodes can communicate (not partitioned).
    pub fn can_communicate(&self, from: NodeId, to: NodeId) -> bool {
        let Ok(partitions) = self.partitions.lock() else {
            return true;
        };

        !partitions.iter().any(|(group_a, group_b)| {
            (group_a.contains(&from) && group_b.contains(&to))
                || (group_b.contains(&from) && group_a.contains(&to))
        })
    }

    /// Gets the latency for a link (default 0).
    pub fn get_latency(&self, from: NodeId, to: NodeId) -> u64 {
        self.link_latency
            .lock()
            .ok()
            .and_then(|l| l.get(&(from, to)).copied())
            .unwrap_or(0)
    }

    /// Gets the loss rate for a link (default 0.0).
    pub fn get_loss(&self, from: NodeId, to: NodeId) -> f64 {
        self.link_loss
            .lock()
            .ok()
            .and_then(|l| l.get(&(from, to)).copied())
            .unwrap_or(0.0)
    }

    /// Draws whether a message on this link is lost.
    pub fn should_drop(&self, from: NodeId, to: NodeId) -> bool {
        let loss = self.get_loss(from, to);
        if loss <= 0.0 {
            return false;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_bool(loss),
            Err(_) => false,
        }
    }

    /// Draws the delivery delay of a message on this link, in nanoseconds.
    ///
    /// Base latency plus the absolute value of a normal jitter sample.
    pub fn sample_delay_ns(&self, from: NodeId, to: NodeId) -> u64 {
        let base_ms = self.get_latency(from, to) as f64;
        let std_ms = self.jitter_std_ms.lock().map(|j| *j).unwrap_or(0.0);

        let jitter_ms = match (Normal::new(0.0, std_ms), self.rng.lock()) {
            (Ok(normal), Ok(mut rng)) if std_ms > 0.0 => normal.sample(&mut *rng).abs(),
            _ => 0.0,
        };
        ((base_ms + jitter_ms) * 1_000_000.0) as u64
    }
}

impl NetworkController for SimNetworkController {
    fn partition(&self, group_a: &[NodeId], group_b: &[NodeId]) {
        if let Ok(mut partitions) = self.partitions.lock() {
            partitions.push((group_a.to_vec(), group_b.to_vec()));
        }
    }

    fn heal_all(&self) {
        if let Ok(mut partitions) = self.partitions.lock() {
            partitions.clear();
        }
    }

    fn set_link_latency(&self, from: NodeId, to: NodeId, latency_ms: u64) {
        if let Ok(mut latencies) = self.link_latency.lock() {
            latencies.insert((from, to), latency_ms);
        }
    }

    fn set_link_loss(&self, from: NodeId, to: NodeId, loss_rate: f64) {
        if let Ok(mut losses) = self.link_loss.lock() {
            losses.insert((from, to), loss_rate.clamp(0.0, 1.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_controller_partition() {
        let controller = SimNetworkController::new(1);

        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);
        let c = NodeId::from_seed(3);

        assert!(controller.can_communicate(a, b));
        assert!(controller.can_communicate(a, c));

        // Partition: {a} vs {b, c}
        controller.partition(&[a], &[b, c]);
        assert!(!controller.can_communicate(a, b));
        assert!(!controller.can_communicate(c, a));
        assert!(controller.can_communicate(b, c));

        controller.heal_all();
        assert!(controller.can_communicate(a, b));
    }

    #[test]
    fn test_network_controller_latency() {
        let controller = SimNetworkController::new(1);
        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);

        assert_eq!(controller.get_latency(a, b), 0);
        controller.set_link_latency(a, b, 100);
        assert_eq!(controller.get_latency(a, b), 100);
        // Reverse direction is separate
        assert_eq!(controller.get_latency(b, a), 0);
        assert_eq!(controller.sample_delay_ns(a, b), 100_000_000);
    }

    #[test]
    fn test_loss_is_seeded() {
        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);
        let draws = |seed| {
            let controller = SimNetworkController::new(seed);
            controller.set_link_loss(a, b, 0.5);
            (0..64).map(|_| controller.should_drop(a, b)).collect::<Vec<_>>()
        };
        assert_eq!(draws(9), draws(9));

        let controller = SimNetworkController::new(9);
        controller.set_link_loss(a, b, 3.0);
        assert_eq!(controller.get_loss(a, b), 1.0);
        assert!(controller.should_drop(a, b));
        assert!(!controller.should_drop(b, a));
    }

    #[test]
    fn test_jitter_never_negative() {
        let controller = SimNetworkController::new(3);
        let a = NodeId::from_seed(1);
        let b = NodeId::from_seed(2);
        controller.set_link_latency(a, b, 10);
        controller.set_jitter(25.0);
        for _ in 0..200 {
            assert!(controller.sample_delay_ns(a, b) >= 10_000_000);
        }

        controller.clear_faults();
        assert_eq!(controller.sample_delay_ns(a, b), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_router() {
        let (router_tx, mut router_rx) = mpsc::channel(16);
        let (_inbox_tx, inbox_rx) = mpsc::channel(16);
        let peers: Vec<NodeId> = (0..3).map(NodeId::from_seed).collect();
        let net = SimNetwork::new(peers[0], peers.clone(), router_tx, inbox_rx);

        let sent = net.broadcast(FrameEnvelope::new(0, 0, vec![1, 2, 3])).await;
        assert_eq!(sent, 2);

        let first = router_rx.try_recv().unwrap();
        assert_eq!(first.from, peers[0]);
        assert_eq!(first.to, peers[1]);
        assert!(net.try_recv().is_none());

        let stranger = NodeId::from_seed(99);
        assert!(net.send(stranger, FrameEnvelope::new(1, 0, vec![])).await.is_err());
    }
}
