//! Statecast Deterministic Simulation Harness
//!
//! Runs one producer and N consumers in a single process, on a virtual
//! clock, over a simulated network whose faults are driven by a seed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock)                           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │  ┌──────────┐   frames   ┌────────┐   delayed  ┌──────────┐ │
//! │  │ Producer │ ─────────► │ Router │ ─────────► │ Consumer │ │
//! │  └──────────┘            └───┬────┘            │   x N    │ │
//! │                              │ loss/partition  └────┬─────┘ │
//! │                         ┌────▼─────────────────────▼─┐      │
//! │                         │  Oracle (published frames) │      │
//! │                         └────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use statecast_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).run(ScenarioId::Lossy).await;
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod network;
mod oracle;
mod runner;
pub mod scenarios;
mod world;

pub use context::SimContext;
pub use exporter::{NodeFrame, SimEvent, SimExport, SimFrame};
pub use network::{SimNetwork, SimNetworkController};
pub use oracle::{Oracle, Violation};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{CountingSink, RouterStats, SimConfig, SimConsumer, SimWorld};

use statecast_core::SessionError;
use thiserror::Error;

/// Harness failures.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Session setup failed: {0}")]
    Session(#[from] SessionError),

    #[error("World has no producer")]
    NoProducer,

    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
