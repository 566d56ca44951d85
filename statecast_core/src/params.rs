//! Named trajectory parameters and presets.
//!
//! This is the configuration boundary: values are clamped to their declared
//! ranges here, so the integrator itself never re-validates them.

use crate::trajectory::Variant;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Upper bound on integration steps.
pub const MAX_STEPS: usize = 20_000;

/// Errors raised when writing parameters by name.
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("Unknown parameter: {0}")]
    Unknown(String),

    #[error("Parameter {name} must be finite, got {value}")]
    NotFinite { name: String, value: f64 },
}

/// Declaration of one tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

impl ParamSpec {
    /// Clamps a value into the declared range.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

const fn spec(
    name: &'static str,
    unit: &'static str,
    default: f64,
    min: f64,
    max: f64,
) -> ParamSpec {
    ParamSpec {
        name,
        unit,
        default,
        min,
        max,
    }
}

/// Every parameter, in declaration order.
pub static PARAM_SPECS: [ParamSpec; 14] = [
    spec("step_count", "steps", 5000.0, 0.0, MAX_STEPS as f64),
    spec("step_size", "s", 0.01, 0.0, 0.05),
    spec("initial_x", "", 0.1, -20.0, 20.0),
    spec("initial_y", "", 0.0, -20.0, 20.0),
    spec("initial_z", "", 0.0, -20.0, 20.0),
    spec("lorenz_sigma", "", 10.0, 0.0, 50.0),
    spec("lorenz_rho", "", 28.0, 0.0, 100.0),
    spec("lorenz_beta", "", 8.0 / 3.0, 0.0, 10.0),
    spec("rossler_a", "", 0.2, 0.0, 1.0),
    spec("rossler_b", "", 0.2, 0.0, 2.0),
    spec("rossler_c", "", 5.7, 0.0, 20.0),
    spec("thomas_b", "", 0.208186, 0.0, 1.0),
    spec("halvorsen_a", "", 1.89, 0.0, 3.0),
    spec("ribbon_width", "units", 0.05, 0.0, 1.0),
];

/// Looks up a parameter declaration by name.
pub fn find_spec(name: &str) -> Option<&'static ParamSpec> {
    PARAM_SPECS.iter().find(|s| s.name == name)
}

/// Scalar parameter set of the trajectory integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryParams {
    /// Number of Euler steps (read as a rounded integer)
    pub step_count: f64,
    /// Euler step `h`
    pub step_size: f64,

    pub initial_x: f64,
    pub initial_y: f64,
    pub initial_z: f64,

    pub lorenz_sigma: f64,
    pub lorenz_rho: f64,
    pub lorenz_beta: f64,

    pub rossler_a: f64,
    pub rossler_b: f64,
    pub rossler_c: f64,

    pub thomas_b: f64,

    pub halvorsen_a: f64,

    /// Strip width handed to the geometry collaborator
    pub ribbon_width: f64,
}

impl Default for TrajectoryParams {
    fn default() -> Self {
        let mut params = Self {
            step_count: 0.0,
            step_size: 0.0,
            initial_x: 0.0,
            initial_y: 0.0,
            initial_z: 0.0,
            lorenz_sigma: 0.0,
            lorenz_rho: 0.0,
            lorenz_beta: 0.0,
            rossler_a: 0.0,
            rossler_b: 0.0,
            rossler_c: 0.0,
            thomas_b: 0.0,
            halvorsen_a: 0.0,
            ribbon_width: 0.0,
        };
        for spec in &PARAM_SPECS {
            if let Some(slot) = params.slot_mut(spec.name) {
                *slot = spec.default;
            }
        }
        params
    }
}

impl TrajectoryParams {
    /// Reads a parameter by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "step_count" => self.step_count,
            "step_size" => self.step_size,
            "initial_x" => self.initial_x,
            "initial_y" => self.initial_y,
            "initial_z" => self.initial_z,
            "lorenz_sigma" => self.lorenz_sigma,
            "lorenz_rho" => self.lorenz_rho,
            "lorenz_beta" => self.lorenz_beta,
            "rossler_a" => self.rossler_a,
            "rossler_b" => self.rossler_b,
            "rossler_c" => self.rossler_c,
            "thomas_b" => self.thomas_b,
            "halvorsen_a" => self.halvorsen_a,
            "ribbon_width" => self.ribbon_width,
            _ => return None,
        };
        Some(value)
    }

    /// Writes a parameter by name, clamped to its declared range.
    ///
    /// Returns the value actually stored.
    pub fn set(&mut self, name: &str, value: f64) -> Result<f64, ParamError> {
        let spec = find_spec(name).ok_or_else(|| ParamError::Unknown(name.to_string()))?;
        if !value.is_finite() {
            return Err(ParamError::NotFinite {
                name: name.to_string(),
                value,
            });
        }
        let clamped = spec.clamp(value);
        if let Some(slot) = self.slot_mut(name) {
            *slot = clamped;
        }
        Ok(clamped)
    }

    /// Number of integration steps: rounded, never negative, capped at `MAX_STEPS`.
    pub fn steps(&self) -> usize {
        if !self.step_count.is_finite() || self.step_count <= 0.0 {
            return 0;
        }
        (self.step_count.round() as usize).min(MAX_STEPS)
    }

    /// The configured initial condition.
    pub fn initial_point(&self) -> Vector3<f64> {
        Vector3::new(self.initial_x, self.initial_y, self.initial_z)
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut f64> {
        let slot = match name {
            "step_count" => &mut self.step_count,
            "step_size" => &mut self.step_size,
            "initial_x" => &mut self.initial_x,
            "initial_y" => &mut self.initial_y,
            "initial_z" => &mut self.initial_z,
            "lorenz_sigma" => &mut self.lorenz_sigma,
            "lorenz_rho" => &mut self.lorenz_rho,
            "lorenz_beta" => &mut self.lorenz_beta,
            "rossler_a" => &mut self.rossler_a,
            "rossler_b" => &mut self.rossler_b,
            "rossler_c" => &mut self.rossler_c,
            "thomas_b" => &mut self.thomas_b,
            "halvorsen_a" => &mut self.halvorsen_a,
            "ribbon_width" => &mut self.ribbon_width,
            _ => return None,
        };
        Some(slot)
    }
}

/// A recallable parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub variant: Variant,
    pub params: TrajectoryParams,
}

/// Presets keyed by integer id.
#[derive(Debug, Clone, Default)]
pub struct PresetBank {
    presets: BTreeMap<u32, Preset>,
}

impl PresetBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bank with one tuned preset per variant, ids 0 to 3.
    pub fn builtin() -> Self {
        let mut bank = Self::new();
        let defaults = TrajectoryParams::default();

        bank.store(0, Preset {
            variant: Variant::Lorenz,
            params: defaults,
        });
        bank.store(1, Preset {
            variant: Variant::Rossler,
            params: TrajectoryParams {
                step_count: 8000.0,
                step_size: 0.02,
                initial_x: 1.0,
                initial_y: 1.0,
                initial_z: 0.0,
                ..defaults
            },
        });
        bank.store(2, Preset {
            variant: Variant::Thomas,
            params: TrajectoryParams {
                step_count: MAX_STEPS as f64,
                step_size: 0.05,
                initial_x: 0.1,
                initial_y: 0.0,
                initial_z: 0.0,
                ..defaults
            },
        });
        bank.store(3, Preset {
            variant: Variant::Halvorsen,
            params: TrajectoryParams {
                step_count: 6000.0,
                step_size: 0.005,
                initial_x: -1.48,
                initial_y: -1.51,
                initial_z: 2.04,
                ..defaults
            },
        });
        bank
    }

    /// Stores or replaces a preset.
    pub fn store(&mut self, id: u32, preset: Preset) {
        self.presets.insert(id, preset);
    }

    /// Looks up a preset.
    pub fn recall(&self, id: u32) -> Option<&Preset> {
        self.presets.get(&id)
    }

    /// Known preset ids, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.presets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
