//! Tick-counter change detection.
//!
//! The counter is the only change oracle. Comparing payloads would cost
//! O(payload) every tick; comparing counters costs one integer compare.
//! Any inequality counts as a change, so the `u32::MAX -> 0` wrap and a
//! producer reset back to 0 are both seen.

/// Outcome of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Downstream artifacts must be re-derived
    Changed,
    /// Nothing to do this tick
    Unchanged,
}

impl Change {
    pub fn is_changed(self) -> bool {
        self == Change::Changed
    }
}

/// Returns true iff the counter moved.
pub fn has_changed(previous: u32, current: u32) -> bool {
    previous != current
}

/// Remembers the last observed tick counter for one downstream consumer.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    last_seen: Option<u32>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares against the previous observation and records `tick_counter`.
    ///
    /// The first observation is always a change.
    pub fn observe(&mut self, tick_counter: u32) -> Change {
        let changed = match self.last_seen {
            Some(previous) => has_changed(previous, tick_counter),
            None => true,
        };
        self.last_seen = Some(tick_counter);

        if changed {
            Change::Changed
        } else {
            Change::Unchanged
        }
    }

    /// Last counter value observed, if any.
    pub fn last_seen(&self) -> Option<u32> {
        self.last_seen
    }
}
