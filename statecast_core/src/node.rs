//! Node Runtime - drives one role's render loop.
//!
//! This module wires the record, field generator, change detector and
//! replication channel into the two roles a process can play.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────── Producer ──────────────┐        ┌───────────── Consumer ─────────────┐
//! │ advance(dt)                           │        │                                     │
//! │   sim_time, angle, tick_counter       │        │ poll()                              │
//! │   regenerate every N ticks            │ frame  │   receive_into(record)  (no wait)   │
//! │ present() -> ChangeDetector -> upload │ ─────► │   ChangeDetector -> upload          │
//! │ publish() -> ReplicationChannel       │        │                                     │
//! └───────────────────────────────────────┘        └─────────────────────────────────────┘
//! ```
//!
//! The producer owns the only mutable record. A consumer owns its received
//! copy and only ever exposes it by shared reference.

use crate::change::{Change, ChangeDetector};
use crate::field;
use crate::record::{Resolution, StateRecord};
use crate::replication::{ChannelStats, ReplicationChannel};
use crate::role::Role;
use crate::sink::{PixelFormat, TextureSink};
use statecast_env::{NetworkTransport, NodeContext, NodeId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration shared by every node of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Raster size; must match on every node
    pub resolution: Resolution,

    /// Render loop rate in Hz (default: 60)
    pub tick_rate_hz: u32,

    /// Regenerate the payload every N ticks; 0 disables (default: 30)
    pub regen_interval_ticks: u32,

    /// Rotation speed in degrees per second (default: 90)
    pub angular_speed_deg_per_sec: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            tick_rate_hz: 60,
            regen_interval_ticks: 30,
            angular_speed_deg_per_sec: 90.0,
        }
    }
}

impl SessionConfig {
    /// Seconds per tick.
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate_hz.max(1) as f64
    }

    /// Wall time per tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.dt())
    }
}

/// Discrete operator commands (from the input collaborator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Zero time, angle and tick counter
    Reset,
    /// Regenerate the payload now, outside the cadence
    ForceRegenerate,
}

impl ControlCommand {
    /// Key bindings: `2` resets, space regenerates.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            '2' => Some(ControlCommand::Reset),
            ' ' => Some(ControlCommand::ForceRegenerate),
            _ => None,
        }
    }
}

/// Wraps an angle in degrees into `[0, 360)`.
fn wrap_degrees(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// The authoritative node.
pub struct Producer<Ctx, Net>
where
    Ctx: NodeContext,
    Net: NetworkTransport,
{
    /// Node identifier
    pub node_id: NodeId,

    context: Arc<Ctx>,
    config: SessionConfig,
    record: StateRecord,
    channel: ReplicationChannel<Net>,
    detector: ChangeDetector,
    regenerations: u64,
}

impl<Ctx, Net> Producer<Ctx, Net>
where
    Ctx: NodeContext,
    Net: NetworkTransport,
{
    /// Creates the producer and renders the initial payload.
    pub fn new(context: Arc<Ctx>, network: Arc<Net>, config: SessionConfig) -> Self {
        let node_id = network.local_id();
        let channel = ReplicationChannel::new(network, config.resolution);

        let mut producer = Self {
            node_id,
            context,
            record: StateRecord::new(config.resolution),
            config,
            channel,
            detector: ChangeDetector::new(),
            regenerations: 0,
        };
        producer.regenerate();
        info!(
            "Producer {}: initial payload generated ({})",
            producer.node_id,
            producer.config.resolution
        );
        producer
    }

    pub fn record(&self) -> &StateRecord {
        &self.record
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> &ChannelStats {
        self.channel.stats()
    }

    /// Number of payload regenerations so far (including the initial one).
    pub fn regenerations(&self) -> u64 {
        self.regenerations
    }

    /// Advances the simulation by one tick of `dt` seconds.
    ///
    /// Returns true if the payload was regenerated on this tick.
    pub fn advance(&mut self, dt: f64) -> bool {
        self.record.sim_time += dt;
        self.record.rotation_angle = wrap_degrees(
            self.record.rotation_angle + dt as f32 * self.config.angular_speed_deg_per_sec,
        );
        self.record.tick_counter = self.record.tick_counter.wrapping_add(1);

        if self.regeneration_due() {
            self.regenerate();
            true
        } else {
            false
        }
    }

    fn regeneration_due(&self) -> bool {
        let interval = self.config.regen_interval_ticks;
        interval != 0 && self.record.tick_counter % interval == 0
    }

    fn regenerate(&mut self) {
        field::regenerate(&mut self.record);
        self.regenerations += 1;
        debug!(
            "Producer {}: generated payload at tick {} time={:.3} angle={:.1}",
            self.node_id,
            self.record.tick_counter,
            self.record.sim_time,
            self.record.rotation_angle
        );
    }

    /// Regenerates the payload immediately, bypassing the cadence.
    pub fn force_regenerate(&mut self) {
        self.regenerate();
    }

    /// Zeroes simulation time, rotation and tick counter.
    pub fn reset_simulation(&mut self) {
        self.record.reset_scalars();
        info!("Producer {}: simulation reset", self.node_id);
    }

    /// Applies an operator command.
    pub fn handle(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Reset => self.reset_simulation(),
            ControlCommand::ForceRegenerate => self.force_regenerate(),
        }
    }

    /// Uploads the payload to the local renderer if the tick moved.
    pub fn present(&mut self, sink: &mut dyn TextureSink) -> Change {
        present(&mut self.detector, &self.record, sink)
    }

    /// Publishes the current record to every consumer.
    pub async fn publish(&mut self) -> usize {
        let timestamp_ms = self.context.now().as_millis() as u64;
        self.channel.publish(&self.record, timestamp_ms).await
    }

    /// One render-loop iteration: advance, present locally, publish.
    pub async fn tick(&mut self, dt: f64, sink: &mut dyn TextureSink) -> usize {
        self.advance(dt);
        self.present(sink);
        self.publish().await
    }
}

/// A passive node displaying the producer's record.
pub struct Consumer<Net: NetworkTransport> {
    /// Node identifier
    pub node_id: NodeId,

    record: StateRecord,
    channel: ReplicationChannel<Net>,
    detector: ChangeDetector,
    received_any: bool,
}

impl<Net: NetworkTransport> Consumer<Net> {
    /// Creates a consumer with an empty record of the session resolution.
    pub fn new(network: Arc<Net>, resolution: Resolution) -> Self {
        let node_id = network.local_id();
        Self {
            node_id,
            record: StateRecord::new(resolution),
            channel: ReplicationChannel::new(network, resolution),
            detector: ChangeDetector::new(),
            received_any: false,
        }
    }

    /// The last received record (all zero before the first frame).
    pub fn record(&self) -> &StateRecord {
        &self.record
    }

    pub fn stats(&self) -> &ChannelStats {
        self.channel.stats()
    }

    /// Sequence of the last applied frame.
    pub fn last_sequence(&self) -> Option<u64> {
        self.channel.last_sequence()
    }

    /// Whether any frame has been applied yet.
    pub fn has_received(&self) -> bool {
        self.received_any
    }

    /// One render-loop iteration: take the newest frame, upload if it changed.
    ///
    /// Never waits. With nothing new the previous record stays on screen.
    pub fn poll(&mut self, sink: &mut dyn TextureSink) -> Change {
        if !self.channel.receive_into(&mut self.record) {
            return Change::Unchanged;
        }
        self.received_any = true;

        let change = present(&mut self.detector, &self.record, sink);
        if change.is_changed() {
            debug!(
                "Consumer {}: updated payload at tick {} time={:.3} angle={:.1}",
                self.node_id,
                self.record.tick_counter,
                self.record.sim_time,
                self.record.rotation_angle
            );
        }
        change
    }
}

fn present(
    detector: &mut ChangeDetector,
    record: &StateRecord,
    sink: &mut dyn TextureSink,
) -> Change {
    let change = detector.observe(record.tick_counter);
    if change.is_changed() {
        sink.upload(record.payload(), record.resolution(), PixelFormat::Rgb8);
    }
    change
}

/// A node in whichever role it was assigned.
pub enum ReplicaNode<Ctx, Net>
where
    Ctx: NodeContext,
    Net: NetworkTransport,
{
    Producer(Producer<Ctx, Net>),
    Consumer(Consumer<Net>),
}

impl<Ctx, Net> ReplicaNode<Ctx, Net>
where
    Ctx: NodeContext,
    Net: NetworkTransport,
{
    pub fn role(&self) -> Role {
        match self {
            ReplicaNode::Producer(_) => Role::Producer,
            ReplicaNode::Consumer(_) => Role::Consumer,
        }
    }

    pub fn node_id(&self) -> NodeId {
        match self {
            ReplicaNode::Producer(p) => p.node_id,
            ReplicaNode::Consumer(c) => c.node_id,
        }
    }

    pub fn record(&self) -> &StateRecord {
        match self {
            ReplicaNode::Producer(p) => p.record(),
            ReplicaNode::Consumer(c) => c.record(),
        }
    }

    pub fn stats(&self) -> &ChannelStats {
        match self {
            ReplicaNode::Producer(p) => p.stats(),
            ReplicaNode::Consumer(c) => c.stats(),
        }
    }

    /// One render-loop iteration for either role.
    pub async fn tick(&mut self, dt: f64, sink: &mut dyn TextureSink) {
        match self {
            ReplicaNode::Producer(p) => {
                p.tick(dt, sink).await;
            }
            ReplicaNode::Consumer(c) => {
                c.poll(sink);
            }
        }
    }

    /// Applies an operator command. Consumers ignore commands.
    pub fn handle(&mut self, command: ControlCommand) {
        match self {
            ReplicaNode::Producer(p) => p.handle(command),
            ReplicaNode::Consumer(c) => {
                debug!("Consumer {}: ignoring {:?}", c.node_id, command);
            }
        }
    }
}
