//! SimWorld - The simulation harness container.
//!
//! One producer and N consumers share a virtual clock. Every frame goes
//! through a central router that applies the controller's fault model
//! (partition, loss, latency, jitter) and holds the frame until its delivery
//! time. Jitter larger than the tick period reorders frames.

use crate::context::SimContext;
use crate::network::{NetworkMessage, SimNetwork, SimNetworkController};
use crate::oracle::Oracle;
use crate::SimError;

use statecast_core::role::assign_roles;
use statecast_core::{
    Consumer, ControlCommand, PixelFormat, Producer, Resolution, Role, SessionConfig,
    StateRecord, TextureSink,
};
use statecast_env::{FrameEnvelope, NodeContext, NodeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Capacity of each node's inbox.
const INBOX_CAPACITY: usize = 1024;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of consumer nodes
    pub num_consumers: usize,

    /// Session settings shared by all nodes
    pub session: SessionConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_consumers: 4,
            session: SessionConfig {
                // Small raster keeps the oracle cheap
                resolution: Resolution { width: 32, height: 32 },
                ..SessionConfig::default()
            },
        }
    }
}

/// Counts texture uploads.
#[derive(Debug, Default)]
pub struct CountingSink {
    pub uploads: u64,
}

impl TextureSink for CountingSink {
    fn upload(&mut self, _pixels: &[u8], _resolution: Resolution, _format: PixelFormat) {
        self.uploads += 1;
    }
}

/// A consumer and its renderer stand-in.
pub struct SimConsumer {
    pub consumer: Consumer<SimNetwork>,
    pub sink: CountingSink,
}

/// Router counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Messages handed to the router
    pub routed: u64,
    /// Messages placed in an inbox
    pub delivered: u64,
    /// Dropped by the loss model
    pub dropped_loss: u64,
    /// Dropped by a partition
    pub dropped_partition: u64,
    /// Dropped because the inbox was full
    pub dropped_overflow: u64,
    /// Largest simulated delay in milliseconds
    pub max_latency_ms: u64,
}

struct InFlight {
    deliver_at_ns: u64,
    order: u64,
    msg: NetworkMessage,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Network controller for fault injection
    pub network_controller: Arc<SimNetworkController>,

    /// Published-frame ground truth
    pub oracle: Oracle,

    producer: Producer<SimContext, SimNetwork>,
    producer_sink: CountingSink,
    consumers: Vec<SimConsumer>,

    router_rx: mpsc::Receiver<NetworkMessage>,
    inboxes: HashMap<NodeId, mpsc::Sender<(NodeId, FrameEnvelope)>>,
    in_flight: Vec<InFlight>,
    next_order: u64,
    router_stats: RouterStats,

    tick_count: u64,
}

impl SimWorld {
    /// Builds the session: node 0 produces, nodes 1..=N consume.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        let fault_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let context = SimContext::shared(config.seed);
        let network_controller = SimNetworkController::shared(fault_seed);

        let ids: Vec<NodeId> = (0..=config.num_consumers as u64).map(NodeId::from_seed).collect();
        let roles = assign_roles(&ids, ids[0])?;

        let (router_tx, router_rx) = mpsc::channel::<NetworkMessage>(10_000);
        let mut inboxes = HashMap::new();
        let mut producer = None;
        let mut consumers = Vec::new();

        for (id, role) in roles {
            let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
            inboxes.insert(id, inbox_tx);
            let network = Arc::new(SimNetwork::new(id, ids.clone(), router_tx.clone(), inbox_rx));

            match role {
                Role::Producer => {
                    producer = Some(Producer::new(
                        Arc::clone(&context),
                        network,
                        config.session.clone(),
                    ));
                }
                Role::Consumer => consumers.push(SimConsumer {
                    consumer: Consumer::new(network, config.session.resolution),
                    sink: CountingSink::default(),
                }),
            }
        }
        let producer = producer.ok_or(SimError::NoProducer)?;

        Ok(Self {
            config,
            context,
            network_controller,
            oracle: Oracle::new(),
            producer,
            producer_sink: CountingSink::default(),
            consumers,
            router_rx,
            inboxes,
            in_flight: Vec::new(),
            next_order: 0,
            router_stats: RouterStats::default(),
            tick_count: 0,
        })
    }

    pub fn producer_id(&self) -> NodeId {
        self.producer.node_id
    }

    pub fn consumer_ids(&self) -> Vec<NodeId> {
        self.consumers.iter().map(|c| c.consumer.node_id).collect()
    }

    pub fn producer(&self) -> &Producer<SimContext, SimNetwork> {
        &self.producer
    }

    pub fn producer_uploads(&self) -> u64 {
        self.producer_sink.uploads
    }

    pub fn consumers(&self) -> &[SimConsumer] {
        &self.consumers
    }

    pub fn router_stats(&self) -> &RouterStats {
        &self.router_stats
    }

    /// Applies an operator command on the producer.
    pub fn command(&mut self, command: ControlCommand) {
        self.producer.handle(command);
    }

    /// One full tick: advance the clock, run the producer, route, run consumers.
    pub async fn tick(&mut self) {
        let dt = self.config.session.dt();
        self.context.advance_time(Duration::from_secs_f64(dt));

        self.producer.tick(dt, &mut self.producer_sink).await;
        self.route();
        self.deliver_due();
        self.poll_consumers();

        self.tick_count += 1;
        if self.tick_count % 60 == 0 {
            debug!(
                "  t={:.2}s | producer tick={} | in flight={} | delivered={}",
                self.time(),
                self.producer.record().tick_counter,
                self.in_flight.len(),
                self.router_stats.delivered
            );
        }
    }

    /// Clears every fault, republishes and delivers everything in flight.
    ///
    /// Afterwards each consumer holds the newest frame it will ever get.
    pub async fn quiesce(&mut self) {
        self.network_controller.clear_faults();
        self.producer.publish().await;
        self.route();

        if let Some(last) = self.in_flight.iter().map(|f| f.deliver_at_ns).max() {
            if last > self.context.time_ns() {
                self.context.set_time(last);
            }
        }
        self.deliver_due();
        self.poll_consumers();
    }

    /// Whether every consumer shows exactly the producer's record.
    pub fn converged(&self) -> bool {
        self.consumers
            .iter()
            .all(|c| c.consumer.record() == self.producer.record())
    }

    /// Consumers whose record differs from the producer's.
    pub fn lagging(&self) -> Vec<NodeId> {
        self.consumers
            .iter()
            .filter(|c| c.consumer.record() != self.producer.record())
            .map(|c| c.consumer.node_id)
            .collect()
    }

    fn route(&mut self) {
        let now = self.context.time_ns();

        while let Ok(msg) = self.router_rx.try_recv() {
            self.router_stats.routed += 1;
            self.oracle.observe(&msg.frame);

            if !self.network_controller.can_communicate(msg.from, msg.to) {
                self.router_stats.dropped_partition += 1;
                continue;
            }
            if self.network_controller.should_drop(msg.from, msg.to) {
                self.router_stats.dropped_loss += 1;
                continue;
            }

            let delay_ns = self.network_controller.sample_delay_ns(msg.from, msg.to);
            let delay_ms = delay_ns / 1_000_000;
            self.router_stats.max_latency_ms = self.router_stats.max_latency_ms.max(delay_ms);
            self.in_flight.push(InFlight {
                deliver_at_ns: now + delay_ns,
                order: self.next_order,
                msg,
            });
            self.next_order += 1;
        }
    }

    fn deliver_due(&mut self) {
        let now = self.context.time_ns();
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|f| f.deliver_at_ns <= now);
        self.in_flight = pending;
        due.sort_by_key(|f| (f.deliver_at_ns, f.order));

        for InFlight { msg, .. } in due {
            let Some(inbox) = self.inboxes.get(&msg.to) else {
                continue;
            };
            trace!("deliver seq={} {} -> {}", msg.frame.sequence, msg.from, msg.to);
            match inbox.try_send((msg.from, msg.frame)) {
                Ok(()) => self.router_stats.delivered += 1,
                Err(_) => self.router_stats.dropped_overflow += 1,
            }
        }
    }

    fn poll_consumers(&mut self) {
        for sim in &mut self.consumers {
            sim.consumer.poll(&mut sim.sink);
            self.oracle
                .verify(sim.consumer.node_id, sim.consumer.last_sequence(), sim.consumer.record());
        }
        self.oracle.prune(self.consumers.len());
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The producer's current record.
    pub fn record(&self) -> &StateRecord {
        self.producer.record()
    }
}
