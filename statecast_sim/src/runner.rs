//! Scenario runner - executes replication fault scenarios.

use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use serde::Serialize;
use statecast_core::{ControlCommand, Resolution, SessionConfig};
use statecast_env::{NetworkController, NodeId};
use tracing::{debug, error, info};

/// Export every Nth tick.
const EXPORT_INTERVAL: u64 = 10;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Frames published by the producer
    pub frames_published: u64,

    /// Frames placed in a consumer inbox
    pub frames_delivered: u64,

    /// Frames dropped by the loss model
    pub dropped_loss: u64,

    /// Frames dropped by a partition
    pub dropped_partition: u64,

    /// Maximum simulated delay (ms)
    pub max_latency_ms: u64,

    /// Texture uploads summed over consumers
    pub consumer_uploads: u64,

    /// Reordered/duplicate frames consumers discarded
    pub stale_dropped: u64,

    /// Frames consumers skipped in favour of a newer one
    pub superseded: u64,

    /// Consumer records that differ from what was published
    pub oracle_mismatches: usize,

    /// Consumers that applied an older frame after a newer one
    pub sequence_regressions: usize,

    /// Every consumer matched the producer after faults cleared
    pub converged: bool,
}

impl ScenarioMetrics {
    fn collect(world: &SimWorld) -> Self {
        let router = world.router_stats();
        let mut metrics = Self {
            frames_published: world.producer().stats().published,
            frames_delivered: router.delivered,
            dropped_loss: router.dropped_loss,
            dropped_partition: router.dropped_partition,
            max_latency_ms: router.max_latency_ms,
            oracle_mismatches: world.oracle.mismatches(),
            sequence_regressions: world.oracle.regressions(),
            converged: world.converged(),
            ..Self::default()
        };
        for c in world.consumers() {
            metrics.consumer_uploads += c.sink.uploads;
            metrics.stale_dropped += c.consumer.stats().stale_dropped;
            metrics.superseded += c.consumer.stats().superseded;
        }
        metrics
    }

    /// Fraction of routed frames lost to the loss model.
    pub fn loss_rate(&self) -> f64 {
        let routed = self.frames_delivered + self.dropped_loss + self.dropped_partition;
        self.dropped_loss as f64 / routed.max(1) as f64
    }
}

/// Runs replication scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of consumers
    num_consumers: usize,

    /// Tick rate in Hz
    tick_rate_hz: u32,

    /// Raster size
    resolution: Resolution,

    /// Maximum duration in seconds
    max_duration_secs: f64,
}

impl ScenarioRunner {
    pub fn new(seed: u64, num_consumers: usize) -> Self {
        let defaults = SimConfig::default();
        Self {
            seed,
            num_consumers,
            tick_rate_hz: defaults.session.tick_rate_hz,
            resolution: defaults.session.resolution,
            max_duration_secs: 10.0,
        }
    }

    /// Sets the tick rate.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz.max(1);
        self
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs.max(0.0);
        self
    }

    /// Sets the raster size.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    fn config(&self) -> SimConfig {
        SimConfig {
            seed: self.seed,
            num_consumers: self.num_consumers,
            session: SessionConfig {
                resolution: self.resolution,
                tick_rate_hz: self.tick_rate_hz,
                ..SessionConfig::default()
            },
        }
    }

    fn target_ticks(&self) -> u64 {
        (self.max_duration_secs * self.tick_rate_hz as f64) as u64
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_recorded(scenario, None).await
    }

    /// Runs a scenario, sampling frames into `export` if given.
    pub async fn run_recorded(
        &self,
        scenario: ScenarioId,
        mut export: Option<&mut SimExport>,
    ) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let target_ticks = self.target_ticks();
        let mut world = match SimWorld::new(self.config()) {
            Ok(world) => world,
            Err(e) => {
                error!("Failed to build world: {}", e);
                return self.failed(scenario, 0, 0.0, e.to_string());
            }
        };

        let producer = world.producer_id();
        let consumers = world.consumer_ids();
        let cut: Vec<NodeId> = consumers.iter().copied().step_by(2).collect();

        match scenario {
            ScenarioId::Steady => {
                for &c in &consumers {
                    world.network_controller.set_link_latency(producer, c, 5);
                }
            }
            ScenarioId::Lossy => {
                for &c in &consumers {
                    world.network_controller.set_link_loss(producer, c, 0.5);
                }
            }
            ScenarioId::Jitter => {
                for &c in &consumers {
                    world.network_controller.set_link_latency(producer, c, 20);
                }
                world.network_controller.set_jitter(40.0);
            }
            ScenarioId::Partition | ScenarioId::Reset => {}
        }

        let partition_start = target_ticks / 3;
        let partition_end = 2 * target_ticks / 3;
        let reset_at = 2 * target_ticks / 3;
        let mut sequences_at_cut: Vec<Option<u64>> = Vec::new();
        let mut partition_leaked = false;
        let mut tick_before_reset = None;

        for tick in 0..target_ticks {
            let mut events = Vec::new();

            if scenario == ScenarioId::Partition {
                if tick == partition_start {
                    info!("  ⚡ Partitioning {} consumer(s) at t={:.1}s", cut.len(), world.time());
                    world.network_controller.partition(&[producer], &cut);
                    sequences_at_cut = cut_sequences(&world, &cut);
                    events.push(SimEvent::info("partition"));
                }
                if tick == partition_end {
                    partition_leaked |= cut_sequences(&world, &cut) != sequences_at_cut;
                    info!("  ✓ Healing partition at t={:.1}s", world.time());
                    world.network_controller.heal_all();
                    events.push(SimEvent::info("heal"));
                }
            }
            if scenario == ScenarioId::Reset && tick == reset_at {
                tick_before_reset = Some(world.record().tick_counter);
                info!("  ↺ Resetting simulation at tick {}", world.record().tick_counter);
                world.command(ControlCommand::Reset);
                events.push(SimEvent::info("reset"));
            }

            world.tick().await;

            if let Some(export) = export.as_deref_mut() {
                if tick % EXPORT_INTERVAL == 0 || !events.is_empty() {
                    export.add_frame(SimFrame::capture(&world, events));
                }
            }
        }

        world.quiesce().await;
        if let Some(export) = export.as_deref_mut() {
            export.add_frame(SimFrame::capture(&world, vec![SimEvent::info("quiesce")]));
        }

        let metrics = ScenarioMetrics::collect(&world);
        let mut failure = check_common(&world, &metrics);

        if failure.is_none() {
            failure = match scenario {
                ScenarioId::Steady => {
                    let expected = target_ticks * consumers.len() as u64 * 9 / 10;
                    let uploads = metrics.consumer_uploads;
                    (uploads < expected).then(|| {
                        format!("Only {} uploads, expected at least {}", uploads, expected)
                    })
                }
                ScenarioId::Lossy => {
                    let rate = metrics.loss_rate();
                    let routed = metrics.frames_delivered + metrics.dropped_loss;
                    (routed >= 100 && !(0.4..=0.6).contains(&rate))
                        .then(|| format!("Unexpected loss rate: {:.1}%", rate * 100.0))
                }
                ScenarioId::Jitter => None,
                ScenarioId::Partition => partition_leaked
                    .then(|| "Partitioned consumer received frames".to_string()),
                ScenarioId::Reset => tick_before_reset.and_then(|before| {
                    world
                        .consumers()
                        .iter()
                        .find(|c| c.consumer.record().tick_counter >= before && before > 0)
                        .map(|c| {
                            format!("Consumer {} did not follow the reset", c.consumer.node_id)
                        })
                }),
            };
        }

        let passed = failure.is_none();
        info!(
            "{} {} complete: published={} delivered={} lost={} stale={} uploads={}",
            if passed { "✓" } else { "✗" },
            scenario.name(),
            metrics.frames_published,
            metrics.frames_delivered,
            metrics.dropped_loss,
            metrics.stale_dropped,
            metrics.consumer_uploads
        );
        if let Some(export) = export {
            export.finalize(passed, failure.clone());
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: target_ticks,
            final_time_secs: world.time(),
            failure_reason: failure,
            metrics,
        }
    }

    fn failed(
        &self,
        scenario: ScenarioId,
        ticks: u64,
        time: f64,
        reason: String,
    ) -> ScenarioResult {
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: ticks,
            final_time_secs: time,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

fn cut_sequences(world: &SimWorld, cut: &[NodeId]) -> Vec<Option<u64>> {
    world
        .consumers()
        .iter()
        .filter(|c| cut.contains(&c.consumer.node_id))
        .map(|c| c.consumer.last_sequence())
        .collect()
}

/// Checks shared by every scenario: oracle clean and converged.
fn check_common(world: &SimWorld, metrics: &ScenarioMetrics) -> Option<String> {
    if let Some(violation) = world.oracle.violations().first() {
        return Some(format!(
            "{} violation(s), first: {}",
            world.oracle.violations().len(),
            violation
        ));
    }
    if !metrics.converged {
        return Some(format!("{} consumer(s) did not converge", world.lagging().len()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(seed: u64) -> ScenarioRunner {
        ScenarioRunner::new(seed, 3)
            .with_duration(2.0)
            .with_resolution(Resolution::square(8).unwrap())
    }

    #[tokio::test]
    async fn test_all_scenarios_pass() {
        for scenario in ScenarioId::all() {
            let result = runner(42).run(scenario).await;
            assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
            assert_eq!(result.total_ticks, 120);
            assert!(result.metrics.converged);
        }
    }

    #[tokio::test]
    async fn test_lossy_drops_frames() {
        let result = runner(7).run(ScenarioId::Lossy).await;
        assert!(result.metrics.dropped_loss > 0);
        assert!(result.metrics.superseded + result.metrics.dropped_loss > 0);
        assert_eq!(result.metrics.oracle_mismatches, 0);
    }

    #[tokio::test]
    async fn test_jitter_reorders() {
        let result = ScenarioRunner::new(3, 2)
            .with_duration(5.0)
            .with_resolution(Resolution::square(4).unwrap())
            .run(ScenarioId::Jitter)
            .await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.stale_dropped > 0, "40ms jitter at 60Hz must reorder");
        assert_eq!(result.metrics.sequence_regressions, 0);
    }

    #[tokio::test]
    async fn test_same_seed_same_metrics() {
        let a = runner(11).run(ScenarioId::Lossy).await;
        let b = runner(11).run(ScenarioId::Lossy).await;
        assert_eq!(a.metrics.dropped_loss, b.metrics.dropped_loss);
        assert_eq!(a.metrics.consumer_uploads, b.metrics.consumer_uploads);
    }

    #[tokio::test]
    async fn test_export_samples_frames() {
        let mut export = SimExport::new("partition", 5);
        let result = runner(5)
            .run_recorded(ScenarioId::Partition, Some(&mut export))
            .await;
        assert!(result.passed);
        assert!(export.passed);
        // 120 ticks sampled every 10, plus partition/heal events and quiesce
        assert!(export.frames.len() >= 13);
        assert!(export
            .frames
            .iter()
            .any(|f| f.events.iter().any(|e| e.message == "partition")));
    }
}
