//! JSON exporter for offline inspection.
//!
//! Exports sampled simulation frames so a run can be plotted after the fact.

use crate::world::SimWorld;
use crate::SimError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single sampled frame of the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Producer state
    pub producer: NodeFrame,

    /// Consumer states
    pub consumers: Vec<NodeFrame>,

    /// Events (partitions, resets, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// What one node was showing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFrame {
    pub node: String,
    pub tick_counter: u32,
    pub sim_time: f64,
    pub rotation_angle: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Ticks behind the producer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag_ticks: Option<i64>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

impl SimFrame {
    /// Samples the world's current state.
    pub fn capture(world: &SimWorld, events: Vec<SimEvent>) -> Self {
        let produced = world.record();
        let producer = NodeFrame {
            node: world.producer_id().to_string(),
            tick_counter: produced.tick_counter,
            sim_time: produced.sim_time,
            rotation_angle: produced.rotation_angle,
            sequence: world.producer().stats().published.checked_sub(1),
            lag_ticks: None,
        };

        let consumers = world
            .consumers()
            .iter()
            .map(|c| {
                let record = c.consumer.record();
                NodeFrame {
                    node: c.consumer.node_id.to_string(),
                    tick_counter: record.tick_counter,
                    sim_time: record.sim_time,
                    rotation_angle: record.rotation_angle,
                    sequence: c.consumer.last_sequence(),
                    lag_ticks: Some(produced.tick_counter as i64 - record.tick_counter as i64),
                }
            })
            .collect();

        Self {
            time_sec: world.time(),
            producer,
            consumers,
            events,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
