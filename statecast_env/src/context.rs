//! Clock context trait for statecast nodes.

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// The node's view of time.
///
/// Abstracts the clock so the same render loop runs against real time
/// (`TokioContext`) or a virtual clock driven by the simulation harness.
#[async_trait]
pub trait NodeContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Returns the context's seed (for logging/debugging).
    ///
    /// Production contexts are not seeded and return 0.
    fn seed(&self) -> u64;
}
