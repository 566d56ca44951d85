//! Variant trajectory integrator.
//!
//! Four closed ODE families share one forward-Euler loop:
//!
//! ```text
//! p[0]   = initial condition
//! p[k+1] = p[k] + h * f(p[k]),   k < step_count
//! ```
//!
//! The whole polyline is recomputed from the initial condition on every
//! update. Nothing is carried between calls except the parameters, so a
//! preset recall between two updates is always safe.

use crate::params::{ParamError, PresetBank, TrajectoryParams};
use crate::sink::GeometrySink;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The selectable vector fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Variant {
    /// `sigma`, `rho`, `beta`
    #[default]
    Lorenz,
    /// `a`, `b`, `c`
    Rossler,
    /// cyclically symmetric, `b`
    Thomas,
    /// cyclically symmetric, `a`
    Halvorsen,
}

impl Variant {
    /// Every variant, in index order.
    pub const ALL: [Variant; 4] = [
        Variant::Lorenz,
        Variant::Rossler,
        Variant::Thomas,
        Variant::Halvorsen,
    ];

    /// Maps a raw mode id onto a variant, clamping out-of-range ids.
    pub fn from_index(index: i64) -> Variant {
        let clamped = index.clamp(0, Self::ALL.len() as i64 - 1);
        Self::ALL[clamped as usize]
    }

    /// Position in `ALL`.
    pub fn index(self) -> usize {
        match self {
            Variant::Lorenz => 0,
            Variant::Rossler => 1,
            Variant::Thomas => 2,
            Variant::Halvorsen => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Lorenz => "lorenz",
            Variant::Rossler => "rossler",
            Variant::Thomas => "thomas",
            Variant::Halvorsen => "halvorsen",
        }
    }

    /// Evaluates `f(p)` for this variant.
    pub fn derivative(self, params: &TrajectoryParams, p: &Vector3<f64>) -> Vector3<f64> {
        match self {
            Variant::Lorenz => lorenz(params, p),
            Variant::Rossler => rossler(params, p),
            Variant::Thomas => thomas(params, p),
            Variant::Halvorsen => halvorsen(params, p),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lorenz" | "0" => Ok(Variant::Lorenz),
            "rossler" | "rössler" | "1" => Ok(Variant::Rossler),
            "thomas" | "2" => Ok(Variant::Thomas),
            "halvorsen" | "3" => Ok(Variant::Halvorsen),
            _ => Err(format!("Unknown variant: {}", s)),
        }
    }
}

fn lorenz(params: &TrajectoryParams, p: &Vector3<f64>) -> Vector3<f64> {
    let (x, y, z) = (p.x, p.y, p.z);
    Vector3::new(
        params.lorenz_sigma * (y - x),
        x * (params.lorenz_rho - z) - y,
        x * y - params.lorenz_beta * z,
    )
}

fn rossler(params: &TrajectoryParams, p: &Vector3<f64>) -> Vector3<f64> {
    let (x, y, z) = (p.x, p.y, p.z);
    Vector3::new(
        -y - z,
        x + params.rossler_a * y,
        params.rossler_b + z * (x - params.rossler_c),
    )
}

fn thomas(params: &TrajectoryParams, p: &Vector3<f64>) -> Vector3<f64> {
    let (x, y, z) = (p.x, p.y, p.z);
    let b = params.thomas_b;
    Vector3::new(y.sin() - b * x, z.sin() - b * y, x.sin() - b * z)
}

fn halvorsen(params: &TrajectoryParams, p: &Vector3<f64>) -> Vector3<f64> {
    let (x, y, z) = (p.x, p.y, p.z);
    let a = params.halvorsen_a;
    Vector3::new(
        -a * x - 4.0 * y - 4.0 * z - y * y,
        -a * y - 4.0 * z - 4.0 * x - z * z,
        -a * z - 4.0 * x - 4.0 * y - x * x,
    )
}

/// Integrates into `out`, replacing its contents with `steps() + 1` points.
pub fn integrate_into(variant: Variant, params: &TrajectoryParams, out: &mut Vec<Vector3<f64>>) {
    let steps = params.steps();
    let h = params.step_size;

    out.clear();
    out.reserve(steps + 1);

    let mut p = params.initial_point();
    out.push(p);
    for _ in 0..steps {
        p += variant.derivative(params, &p) * h;
        out.push(p);
    }
}

/// Integrates a fresh trajectory.
pub fn integrate(variant: Variant, params: &TrajectoryParams) -> Vec<Vector3<f64>> {
    let mut out = Vec::new();
    integrate_into(variant, params, &mut out);
    out
}

/// Selected variant, parameters, and the running point.
#[derive(Debug, Clone)]
pub struct TrajectoryIntegrator {
    variant: Variant,
    params: TrajectoryParams,
    current: Vector3<f64>,
    points: Vec<Vector3<f64>>,
}

impl TrajectoryIntegrator {
    pub fn new(variant: Variant, params: TrajectoryParams) -> Self {
        Self {
            variant,
            current: params.initial_point(),
            params,
            points: Vec::new(),
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Switches the vector field. The running point restarts.
    pub fn set_variant(&mut self, variant: Variant) {
        self.variant = variant;
        self.reset();
    }

    pub fn params(&self) -> &TrajectoryParams {
        &self.params
    }

    /// Writes one parameter through the clamping configuration layer.
    ///
    /// Changing the step count or the initial condition restarts the running point.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<f64, ParamError> {
        let stored = self.params.set(name, value)?;
        if matches!(name, "step_count" | "initial_x" | "initial_y" | "initial_z") {
            self.reset();
        }
        Ok(stored)
    }

    /// Bulk-overwrites variant and parameters from a preset.
    ///
    /// Unknown ids leave the integrator untouched and return false.
    pub fn recall_preset(&mut self, bank: &PresetBank, id: u32) -> bool {
        let Some(preset) = bank.recall(id) else {
            debug!("Preset {} not found", id);
            return false;
        };
        self.variant = preset.variant;
        self.params = preset.params;
        self.reset();
        true
    }

    /// Returns the running point to the initial condition.
    pub fn reset(&mut self) {
        self.current = self.params.initial_point();
    }

    /// Last point of the most recent update (the initial condition after a reset).
    pub fn current(&self) -> Vector3<f64> {
        self.current
    }

    /// Recomputes the whole trajectory from the initial condition.
    pub fn update(&mut self) -> &[Vector3<f64>] {
        integrate_into(self.variant, &self.params, &mut self.points);
        if let Some(last) = self.points.last() {
            self.current = *last;
        }
        &self.points
    }

    /// Recomputes and hands the polyline to the geometry collaborator.
    pub fn update_into(&mut self, sink: &mut dyn GeometrySink) {
        self.update();
        sink.build_strip(&self.points, self.params.ribbon_width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::MAX_STEPS;
    use approx::assert_relative_eq;

    fn params_with(step_count: f64, step_size: f64) -> TrajectoryParams {
        TrajectoryParams {
            step_count,
            step_size,
            initial_x: 0.5,
            initial_y: -0.25,
            initial_z: 1.5,
            ..TrajectoryParams::default()
        }
    }

    #[test]
    fn test_zero_steps_returns_initial_point() {
        let params = params_with(0.0, 0.01);
        for variant in Variant::ALL {
            let points = integrate(variant, &params);
            assert_eq!(points.len(), 1, "{}", variant);
            assert_eq!(points[0], params.initial_point(), "{}", variant);
        }
    }

    #[test]
    fn test_zero_step_size_is_stationary() {
        let params = params_with(25.0, 0.0);
        for variant in Variant::ALL {
            let points = integrate(variant, &params);
            assert_eq!(points.len(), 26, "{}", variant);
            assert!(points.iter().all(|p| *p == params.initial_point()), "{}", variant);
        }
    }

    #[test]
    fn test_single_lorenz_step() {
        let params = params_with(1.0, 0.01);
        let points = integrate(Variant::Lorenz, &params);
        // f(0.5, -0.25, 1.5) = (10 * -0.75, 0.5 * 26.5 + 0.25, -0.125 - 4.0)
        assert_relative_eq!(points[1].x, 0.5 + 0.01 * -7.5, epsilon = 1e-12);
        assert_relative_eq!(points[1].y, -0.25 + 0.01 * 13.5, epsilon = 1e-12);
        assert_relative_eq!(points[1].z, 1.5 + 0.01 * (-0.125 - 4.0), epsilon = 1e-12);
    }

    #[test]
    fn test_rossler_derivative() {
        let params = TrajectoryParams::default();
        let d = Variant::Rossler.derivative(&params, &Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(d.x, -5.0);
        assert_relative_eq!(d.y, 1.0 + 0.2 * 2.0);
        assert_relative_eq!(d.z, 0.2 + 3.0 * (1.0 - 5.7));
    }

    #[test]
    fn test_thomas_and_halvorsen_fixed_point_at_origin() {
        let params = TrajectoryParams::default();
        let origin = Vector3::zeros();
        assert_eq!(Variant::Thomas.derivative(&params, &origin), origin);
        assert_eq!(Variant::Halvorsen.derivative(&params, &origin), origin);
    }

    #[test]
    fn test_variants_use_disjoint_coefficients() {
        let p = Vector3::new(0.3, -0.7, 1.1);
        let base = TrajectoryParams::default();
        let lorenz_tweak = TrajectoryParams { lorenz_rho: 5.0, ..base };

        assert_ne!(
            Variant::Lorenz.derivative(&base, &p),
            Variant::Lorenz.derivative(&lorenz_tweak, &p)
        );
        for variant in [Variant::Rossler, Variant::Thomas, Variant::Halvorsen] {
            assert_eq!(variant.derivative(&base, &p), variant.derivative(&lorenz_tweak, &p));
        }
    }

    #[test]
    fn test_step_count_capped() {
        let params = params_with(1e9, 0.0);
        assert_eq!(integrate(Variant::Thomas, &params).len(), MAX_STEPS + 1);
    }

    #[test]
    fn test_variant_from_index_clamps() {
        assert_eq!(Variant::from_index(-3), Variant::Lorenz);
        assert_eq!(Variant::from_index(2), Variant::Thomas);
        assert_eq!(Variant::from_index(42), Variant::Halvorsen);
        for variant in Variant::ALL {
            assert_eq!(Variant::from_index(variant.index() as i64), variant);
        }
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("Rossler".parse::<Variant>(), Ok(Variant::Rossler));
        assert_eq!("3".parse::<Variant>(), Ok(Variant::Halvorsen));
        assert!("duffing".parse::<Variant>().is_err());
    }

    #[test]
    fn test_update_recomputes_from_scratch() {
        let mut integrator = TrajectoryIntegrator::new(Variant::Lorenz, params_with(100.0, 0.01));
        let first = integrator.update().to_vec();
        let second = integrator.update().to_vec();
        assert_eq!(first, second);
        assert_eq!(integrator.current(), first[100]);
    }

    #[test]
    fn test_reset_and_step_count_change_restart_running_point() {
        let mut integrator = TrajectoryIntegrator::new(Variant::Rossler, params_with(50.0, 0.01));
        integrator.update();
        assert_ne!(integrator.current(), integrator.params().initial_point());

        integrator.reset();
        assert_eq!(integrator.current(), integrator.params().initial_point());

        integrator.update();
        integrator.set_param("step_count", 10.0).unwrap();
        assert_eq!(integrator.current(), integrator.params().initial_point());
        assert_eq!(integrator.update().len(), 11);
    }

    #[test]
    fn test_set_variant_restarts_running_point() {
        let mut integrator = TrajectoryIntegrator::new(Variant::Lorenz, params_with(40.0, 0.01));
        let lorenz = integrator.update().to_vec();
        assert_ne!(integrator.current(), integrator.params().initial_point());

        integrator.set_variant(Variant::Thomas);
        assert_eq!(integrator.variant(), Variant::Thomas);
        assert_eq!(integrator.current(), integrator.params().initial_point());

        let thomas = integrator.update().to_vec();
        assert_eq!(thomas.len(), lorenz.len());
        assert_eq!(thomas[0], lorenz[0]);
        assert_ne!(thomas[40], lorenz[40]);
    }

    #[test]
    fn test_recall_preset_between_updates() {
        let bank = PresetBank::builtin();
        let mut integrator = TrajectoryIntegrator::new(Variant::Lorenz, params_with(10.0, 0.01));
        integrator.update();

        assert!(integrator.recall_preset(&bank, 3));
        assert_eq!(integrator.variant(), Variant::Halvorsen);
        assert_eq!(integrator.current(), integrator.params().initial_point());
        assert_eq!(integrator.update().len(), integrator.params().steps() + 1);

        assert!(!integrator.recall_preset(&bank, 77));
        assert_eq!(integrator.variant(), Variant::Halvorsen);
    }

    #[test]
    fn test_update_into_feeds_geometry_sink() {
        struct Capture(usize, f64);
        impl GeometrySink for Capture {
            fn build_strip(&mut self, points: &[Vector3<f64>], width: f64) {
                self.0 = points.len();
                self.1 = width;
            }
        }

        let mut sink = Capture(0, 0.0);
        let mut integrator = TrajectoryIntegrator::new(Variant::Thomas, params_with(7.0, 0.05));
        integrator.update_into(&mut sink);
        assert_eq!(sink.0, 8);
        assert_relative_eq!(sink.1, 0.05);
    }
}
