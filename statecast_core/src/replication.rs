//! Whole-record replication over a `NetworkTransport`.
//!
//! Publishing is fire-and-forget: one frame per tick, no acknowledgment, no
//! retransmission. A lost frame is superseded by the next one.
//!
//! Receiving drains whatever has arrived without waiting and applies only the
//! newest frame, overwriting the local record wholesale. Each frame carries
//! a sequence number that the publisher never resets (not even when the
//! simulation is reset), so a consumer drops reordered or duplicate frames
//! and never moves backwards.
//!
//! A frame from a sender not seen before starts a new session: a restarted
//! producer is followed even though its sequence starts over. The sender it
//! replaced is retired, and its late frames are dropped from then on.

use crate::record::{Resolution, StateRecord};
use statecast_env::{FrameEnvelope, NetworkTransport, NodeId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Counters kept by a channel endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Frames published (producer)
    pub published: u64,
    /// Sum of per-publish fan-out (producer)
    pub deliveries: u64,
    /// Frames taken off the transport (consumer)
    pub received: u64,
    /// Frames applied to the local record (consumer)
    pub applied: u64,
    /// Frames older than the last applied one, or from a retired sender (consumer)
    pub stale_dropped: u64,
    /// Frames replaced by a newer one in the same poll (consumer)
    pub superseded: u64,
    /// Frames with the wrong size (consumer)
    pub malformed_dropped: u64,
}

/// One endpoint of the replication channel.
pub struct ReplicationChannel<Net: NetworkTransport> {
    network: Arc<Net>,
    resolution: Resolution,
    next_sequence: u64,
    /// Sender whose frames are currently followed
    session: Option<NodeId>,
    /// Sequence of the last frame applied from `session`
    last_applied: Option<u64>,
    retired: HashSet<NodeId>,
    stats: ChannelStats,
}

impl<Net: NetworkTransport> ReplicationChannel<Net> {
    /// Creates an endpoint for records of the given resolution.
    pub fn new(network: Arc<Net>, resolution: Resolution) -> Self {
        Self {
            network,
            resolution,
            next_sequence: 0,
            session: None,
            last_applied: None,
            retired: HashSet::new(),
            stats: ChannelStats::default(),
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.network.local_id()
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Sequence of the last applied frame, if any.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_applied
    }

    /// Sender currently followed, if any.
    pub fn session(&self) -> Option<NodeId> {
        self.session
    }

    /// Publishes the full record to every consumer.
    ///
    /// Returns how many nodes the transport handed the frame to.
    pub async fn publish(&mut self, record: &StateRecord, timestamp_ms: u64) -> usize {
        debug_assert_eq!(record.resolution(), self.resolution);

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let frame = FrameEnvelope::new(sequence, timestamp_ms, record.to_bytes());
        let delivered = self.network.broadcast(frame).await;

        self.stats.published += 1;
        self.stats.deliveries += delivered as u64;
        trace!(
            "Published seq={} tick={} to {} node(s)",
            sequence,
            record.tick_counter,
            delivered
        );
        delivered
    }

    /// Applies the newest pending frame to `record`.
    ///
    /// Never blocks. Returns false if nothing newer arrived, in which case
    /// `record` keeps its last received state. Sequences are only compared
    /// within the followed sender's session.
    pub fn receive_into(&mut self, record: &mut StateRecord) -> bool {
        let expected_len = self.resolution.record_len();
        let mut newest: Option<FrameEnvelope> = None;

        while let Some((from, frame)) = self.network.try_recv() {
            self.stats.received += 1;

            if frame.size() != expected_len {
                warn!(
                    "Dropping {} byte frame from {} (expected {} bytes)",
                    frame.size(),
                    from,
                    expected_len
                );
                self.stats.malformed_dropped += 1;
                continue;
            }
            if self.retired.contains(&from) {
                trace!("Dropping seq={} from retired sender {}", frame.sequence, from);
                self.stats.stale_dropped += 1;
                continue;
            }
            if self.session != Some(from) {
                self.follow(from);
                if newest.take().is_some() {
                    self.stats.superseded += 1;
                }
            }

            if self.last_applied.is_some_and(|last| frame.sequence <= last) {
                self.stats.stale_dropped += 1;
                continue;
            }
            match &newest {
                Some(held) if held.sequence >= frame.sequence => {
                    self.stats.superseded += 1;
                }
                Some(_) => {
                    self.stats.superseded += 1;
                    newest = Some(frame);
                }
                None => newest = Some(frame),
            }
        }

        let Some(frame) = newest else {
            return false;
        };
        match record.decode_from(&frame.frame) {
            Ok(()) => {
                self.last_applied = Some(frame.sequence);
                self.stats.applied += 1;
                true
            }
            Err(e) => {
                warn!("Dropping frame seq={}: {}", frame.sequence, e);
                self.stats.malformed_dropped += 1;
                false
            }
        }
    }

    /// Starts a new session with `sender`, retiring the previous one.
    fn follow(&mut self, sender: NodeId) {
        if let Some(previous) = self.session.replace(sender) {
            debug!("Following new producer {} (retiring {})", sender, previous);
            self.retired.insert(previous);
        }
        self.last_applied = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field;
    use crate::testing::LoopbackHub;

    fn res() -> Resolution {
        Resolution::square(8).unwrap()
    }

    fn record_at(tick: u32) -> StateRecord {
        let mut record = StateRecord::new(res());
        record.sim_time = tick as f64 / 60.0;
        record.tick_counter = tick;
        record
    }

    fn frame_at(tick: u32) -> FrameEnvelope {
        FrameEnvelope::new(tick as u64, 0, record_at(tick).to_bytes())
    }

    #[tokio::test]
    async fn test_round_trip_matches_field_for_field() {
        let hub = LoopbackHub::new();
        let producer_id = NodeId::from_seed(0);
        let consumer_id = NodeId::from_seed(1);
        let mut producer = ReplicationChannel::new(hub.join(producer_id), res());
        let mut consumer = ReplicationChannel::new(hub.join(consumer_id), res());

        let mut sent = StateRecord::new(res());
        sent.sim_time = 12.5;
        sent.rotation_angle = 270.0;
        sent.tick_counter = 42;
        field::regenerate(&mut sent);

        assert_eq!(producer.publish(&sent, 0).await, 1);

        let mut local = StateRecord::new(res());
        assert!(consumer.receive_into(&mut local));
        assert_eq!(local, sent);
        assert_eq!(consumer.last_sequence(), Some(0));
    }

    #[tokio::test]
    async fn test_nothing_pending_keeps_stale_record() {
        let hub = LoopbackHub::new();
        let mut consumer = ReplicationChannel::new(hub.join(NodeId::from_seed(1)), res());
        let mut local = record_at(7);

        assert!(!consumer.receive_into(&mut local));
        assert_eq!(local, record_at(7));
    }

    #[tokio::test]
    async fn test_only_newest_frame_is_applied() {
        let hub = LoopbackHub::new();
        let mut producer = ReplicationChannel::new(hub.join(NodeId::from_seed(0)), res());
        let mut consumer = ReplicationChannel::new(hub.join(NodeId::from_seed(1)), res());

        for tick in 1..=3 {
            producer.publish(&record_at(tick), 0).await;
        }

        let mut local = StateRecord::new(res());
        assert!(consumer.receive_into(&mut local));
        assert_eq!(local.tick_counter, 3);
        assert_eq!(consumer.stats().received, 3);
        assert_eq!(consumer.stats().superseded, 2);
        assert_eq!(consumer.stats().applied, 1);
    }

    #[tokio::test]
    async fn test_reordered_frame_never_regresses() {
        let hub = LoopbackHub::new();
        let producer_id = NodeId::from_seed(0);
        let consumer_id = NodeId::from_seed(1);
        let mut consumer = ReplicationChannel::new(hub.join(consumer_id), res());

        hub.inject(consumer_id, producer_id, frame_at(5));
        let mut local = StateRecord::new(res());
        assert!(consumer.receive_into(&mut local));

        // A late frame from before
        hub.inject(consumer_id, producer_id, frame_at(4));
        assert!(!consumer.receive_into(&mut local));
        assert_eq!(local.tick_counter, 5);
        assert_eq!(consumer.stats().stale_dropped, 1);
    }

    #[tokio::test]
    async fn test_reset_tick_is_followed() {
        // The simulation reset lowers the tick, but the sequence keeps growing
        let hub = LoopbackHub::new();
        let mut producer = ReplicationChannel::new(hub.join(NodeId::from_seed(0)), res());
        let mut consumer = ReplicationChannel::new(hub.join(NodeId::from_seed(1)), res());
        let mut local = StateRecord::new(res());

        producer.publish(&record_at(500), 0).await;
        assert!(consumer.receive_into(&mut local));
        producer.publish(&record_at(0), 0).await;
        assert!(consumer.receive_into(&mut local));
        assert_eq!(local.tick_counter, 0);
    }

    #[tokio::test]
    async fn test_restarted_producer_starts_new_session() {
        let hub = LoopbackHub::new();
        let consumer_id = NodeId::from_seed(1);
        let mut consumer = ReplicationChannel::new(hub.join(consumer_id), res());
        let mut local = StateRecord::new(res());

        hub.inject(consumer_id, NodeId::from_seed(10), frame_at(900));
        assert!(consumer.receive_into(&mut local));

        let restarted = FrameEnvelope::new(0, 0, record_at(1).to_bytes());
        hub.inject(consumer_id, NodeId::from_seed(11), restarted);
        assert!(consumer.receive_into(&mut local));
        assert_eq!(local.tick_counter, 1);
        assert_eq!(consumer.session(), Some(NodeId::from_seed(11)));
    }

    #[tokio::test]
    async fn test_late_frame_from_replaced_producer_is_dropped() {
        let hub = LoopbackHub::new();
        let consumer_id = NodeId::from_seed(1);
        let old = NodeId::from_seed(10);
        let new = NodeId::from_seed(11);
        let mut consumer = ReplicationChannel::new(hub.join(consumer_id), res());
        let mut local = StateRecord::new(res());

        hub.inject(consumer_id, old, frame_at(900));
        assert!(consumer.receive_into(&mut local));
        hub.inject(consumer_id, new, frame_at(5));
        assert!(consumer.receive_into(&mut local));

        // Still in flight when the old producer died
        hub.inject(consumer_id, old, frame_at(901));
        assert!(!consumer.receive_into(&mut local));
        assert_eq!(local.tick_counter, 5);
        assert_eq!(consumer.stats().stale_dropped, 1);

        hub.inject(consumer_id, new, frame_at(6));
        assert!(consumer.receive_into(&mut local));
        assert_eq!(local.tick_counter, 6);
        assert_eq!(consumer.last_sequence(), Some(6));
    }

    #[tokio::test]
    async fn test_mixed_senders_in_one_poll_follow_the_new_one() {
        let old = NodeId::from_seed(10);
        let new = NodeId::from_seed(11);

        for old_first in [true, false] {
            let hub = LoopbackHub::new();
            let consumer_id = NodeId::from_seed(1);
            let mut consumer = ReplicationChannel::new(hub.join(consumer_id), res());
            let mut local = StateRecord::new(res());

            hub.inject(consumer_id, old, frame_at(900));
            assert!(consumer.receive_into(&mut local));

            if old_first {
                hub.inject(consumer_id, old, frame_at(902));
                hub.inject(consumer_id, new, frame_at(7));
            } else {
                hub.inject(consumer_id, new, frame_at(7));
                hub.inject(consumer_id, old, frame_at(902));
            }
            assert!(consumer.receive_into(&mut local));
            assert_eq!(local.tick_counter, 7, "old_first={}", old_first);
            assert_eq!(consumer.session(), Some(new));
        }
    }

    #[tokio::test]
    async fn test_wrong_size_frame_is_dropped() {
        let hub = LoopbackHub::new();
        let producer_id = NodeId::from_seed(0);
        let consumer_id = NodeId::from_seed(1);
        let mut consumer = ReplicationChannel::new(hub.join(consumer_id), res());

        let foreign = StateRecord::new(Resolution::square(4).unwrap());
        hub.inject(consumer_id, producer_id, FrameEnvelope::new(0, 0, foreign.to_bytes()));

        let mut local = record_at(3);
        assert!(!consumer.receive_into(&mut local));
        assert_eq!(local, record_at(3));
        assert_eq!(consumer.stats().malformed_dropped, 1);
    }

    #[tokio::test]
    async fn test_publish_without_consumers() {
        let hub = LoopbackHub::new();
        let mut producer = ReplicationChannel::new(hub.join(NodeId::from_seed(0)), res());
        assert_eq!(producer.publish(&record_at(1), 0).await, 0);
        assert_eq!(producer.stats().published, 1);
        assert_eq!(producer.stats().deliveries, 0);
    }
}
