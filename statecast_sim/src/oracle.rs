//! Ground truth oracle for simulation.
//!
//! The Oracle remembers every frame the producer put on the wire, keyed by
//! sequence number, and checks what consumers end up displaying against it:
//! - A consumer's record must equal, byte for byte, the frame it claims to hold
//! - A consumer's applied sequence must never move backwards

use statecast_core::StateRecord;
use statecast_env::{FrameEnvelope, NodeId};
use std::collections::{BTreeMap, HashMap};

/// A failed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Consumer shows bytes that were never published under that sequence
    Mismatch { node: NodeId, sequence: u64 },
    /// Consumer applied an older frame after a newer one
    Regression { node: NodeId, from: u64, to: u64 },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::Mismatch { node, sequence } => {
                write!(f, "node {} holds a record that differs from seq {}", node, sequence)
            }
            Violation::Regression { node, from, to } => {
                write!(f, "node {} went back from seq {} to seq {}", node, from, to)
            }
        }
    }
}

/// Record of every published frame.
#[derive(Debug, Default)]
pub struct Oracle {
    /// Published frame bytes by sequence
    published: BTreeMap<u64, Vec<u8>>,

    /// Last verified sequence per consumer
    verified: HashMap<NodeId, u64>,

    /// Everything that went wrong
    violations: Vec<Violation>,
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers a frame seen on the wire. Repeats of a sequence are ignored.
    pub fn observe(&mut self, frame: &FrameEnvelope) {
        self.published
            .entry(frame.sequence)
            .or_insert_with(|| frame.frame.clone());
    }

    /// Newest published sequence.
    pub fn latest_sequence(&self) -> Option<u64> {
        self.published.keys().next_back().copied()
    }

    /// Number of distinct frames retained.
    pub fn retained(&self) -> usize {
        self.published.len()
    }

    /// Checks a consumer's state after a poll.
    ///
    /// `sequence` is the consumer's last applied sequence. Returns false if
    /// a violation was recorded.
    pub fn verify(&mut self, node: NodeId, sequence: Option<u64>, record: &StateRecord) -> bool {
        let Some(sequence) = sequence else {
            return true;
        };

        let mut ok = true;
        if let Some(&previous) = self.verified.get(&node) {
            if sequence < previous {
                self.violations.push(Violation::Regression {
                    node,
                    from: previous,
                    to: sequence,
                });
                ok = false;
            }
            if sequence == previous {
                return ok;
            }
        }

        let matches = self
            .published
            .get(&sequence)
            .is_some_and(|bytes| record.to_bytes() == *bytes);
        if !matches {
            self.violations.push(Violation::Mismatch { node, sequence });
            ok = false;
        }

        self.verified.insert(node, sequence);
        ok
    }

    /// Drops frames older than every consumer's last verified sequence.
    ///
    /// Does nothing until all `consumers` have verified at least one frame.
    pub fn prune(&mut self, consumers: usize) {
        if self.verified.len() < consumers {
            return;
        }
        if let Some(&oldest) = self.verified.values().min() {
            self.published = self.published.split_off(&oldest);
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn mismatches(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| matches!(v, Violation::Mismatch { .. }))
            .count()
    }

    pub fn regressions(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| matches!(v, Violation::Regression { .. }))
            .count()
    }
}
