//! Statecast Node - one producer or consumer process
//!
//! Reads its role from the environment, opens the TCP replication channel
//! and runs the render loop:
//! - Producer: advance the simulation, regenerate the payload on cadence,
//!   upload locally, stream the record to every consumer
//! - Consumer: apply the newest received record, upload when the tick moved
//!
//! Keys on stdin: `2` resets the simulation, space regenerates the payload.

use anyhow::{Context, Result};
use clap::Parser;
use statecast_core::{
    Consumer, PresetBank, Producer, ReplicaNode, Resolution, Role, RoleCoordinator,
    SessionConfig, SessionError, TrajectoryIntegrator, TrajectoryParams, Variant,
};
use statecast_env::{NodeContext, NodeId, TcpTransport, TokioContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod input;
mod sinks;

use sinks::{LoggingGeometry, LoggingTexture};

/// Statecast replication node
#[derive(Parser, Debug)]
#[command(name = "statecast-node")]
#[command(about = "Run one producer or consumer of a statecast session", long_about = None)]
struct Args {
    /// Producer address (bound by the producer, dialed by consumers)
    #[arg(short, long, default_value = "127.0.0.1:7400")]
    addr: String,

    /// Raster edge length in pixels (must match across the session)
    #[arg(short, long, default_value = "1080")]
    resolution: u32,

    /// Render loop rate in Hz
    #[arg(long, default_value = "60")]
    tick_rate: u32,

    /// Regenerate the payload every N ticks (0 disables)
    #[arg(long, default_value = "30")]
    regen_interval: u32,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Also integrate and emit the trajectory overlay every tick
    #[arg(short, long)]
    trajectory: bool,

    /// Trajectory variant (lorenz, rossler, thomas, halvorsen)
    #[arg(long, default_value = "lorenz")]
    variant: Variant,

    /// Recall a built-in trajectory preset (overrides --variant)
    #[arg(short, long)]
    preset: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let coordinator = RoleCoordinator::from_env();
    let resolution = Resolution::square(args.resolution).context("invalid --resolution")?;
    let config = SessionConfig {
        resolution,
        tick_rate_hz: args.tick_rate.max(1),
        regen_interval_ticks: args.regen_interval,
        ..SessionConfig::default()
    };

    let context = TokioContext::shared();
    let mut node = match open_node(&args.addr, coordinator.role(), &context, &config).await {
        Ok(node) => node,
        Err(e) => {
            error!("Node '{}': {:#}", coordinator.node_name(), e);
            return Err(e);
        }
    };
    info!(
        "Node '{}' ({}) running as {} at {} Hz, {}",
        coordinator.node_name(),
        node.node_id(),
        node.role(),
        config.tick_rate_hz,
        config.resolution
    );

    let mut trajectory = args.trajectory.then(|| {
        let mut integrator = TrajectoryIntegrator::new(args.variant, TrajectoryParams::default());
        if let Some(id) = args.preset {
            if !integrator.recall_preset(&PresetBank::builtin(), id) {
                error!("Unknown preset {}, keeping {}", id, args.variant);
            }
        }
        info!("Trajectory overlay: {}", integrator.variant());
        integrator
    });

    let mut commands = input::spawn_key_reader();
    let mut texture = LoggingTexture::default();
    let mut geometry = LoggingGeometry::default();
    let deadline = args.duration;
    let period = config.tick_period();
    let dt = config.dt();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted");
                break;
            }
            _ = context.sleep(period) => {}
        }

        while let Ok(command) = commands.try_recv() {
            node.handle(command);
        }
        node.tick(dt, &mut texture).await;

        if let Some(integrator) = trajectory.as_mut() {
            integrator.update_into(&mut geometry);
        }
        if deadline.is_some_and(|d| context.now() >= d) {
            break;
        }
    }

    let stats = node.stats();
    info!(
        "Node '{}' stopping: tick={} uploads={} published={} applied={} stale={} strips={}",
        coordinator.node_name(),
        node.record().tick_counter,
        texture.uploads,
        stats.published,
        stats.applied,
        stats.stale_dropped,
        geometry.strips
    );
    Ok(())
}

/// Opens the replication channel for the decided role.
async fn open_node(
    addr: &str,
    role: Role,
    context: &Arc<TokioContext>,
    config: &SessionConfig,
) -> Result<ReplicaNode<TokioContext, TcpTransport>> {
    let node_id = NodeId::new();
    let frame_len = config.resolution.record_len();

    let node = match role {
        Role::Producer => {
            let network = TcpTransport::bind_producer(addr, node_id, frame_len)
                .await
                .map_err(SessionError::from)
                .with_context(|| format!("cannot listen on {}", addr))?;
            let producer = Producer::new(Arc::clone(context), Arc::new(network), config.clone());
            ReplicaNode::Producer(producer)
        }
        Role::Consumer => {
            let network = TcpTransport::connect_consumer(addr, node_id, frame_len)
                .await
                .map_err(SessionError::from)
                .with_context(|| format!("cannot reach producer at {}", addr))?;
            ReplicaNode::Consumer(Consumer::new(Arc::new(network), config.resolution))
        }
    };
    Ok(node)
}

/// Parses a non-negative, finite number of seconds.
fn parse_duration(arg: &str) -> Result<Duration, String> {
    let secs: f64 = arg.parse().map_err(|e| format!("{}", e))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| format!("{} is not a valid number of seconds", arg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_argument() {
        assert_eq!(parse_duration("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("NaN").is_err());
        assert!(parse_duration("inf").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_negative_duration_is_rejected_by_the_cli() {
        assert!(Args::try_parse_from(["statecast-node", "--duration", "-3"]).is_err());
        let args = Args::try_parse_from(["statecast-node", "--duration", "2"]).unwrap();
        assert_eq!(args.duration, Some(Duration::from_secs(2)));
    }
}
