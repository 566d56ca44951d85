//! Procedural RGB field.
//!
//! Maps `(sim_time, rotation_angle, tick_counter)` to a raster. The output is
//! a pure function of those inputs and the resolution, so a consumer could
//! recompute it; replicating the bytes is what lets it not have to.
//!
//! Per pixel, in `f32`:
//! ```text
//! (nx, ny)  normalized to [-1, 1], rotated by the angle -> (rx, ry)
//! wave1   = sin(8 rx + 2 t) / 2 + 1/2
//! wave2   = cos(6 ry + 1.5 t) / 2 + 1/2
//! radial  = |(rx, ry)|
//! ripple  = sin(10 radial - 4 t) / 2 + 1/2
//! spiral  = sin(atan2(ry, rx) + 3 radial - 2 t) / 2 + 1/2
//! r = wave1 * ripple * spiral
//! g = wave2 * (1 - 0.3 radial)
//! b = (wave1 + wave2) / 2 * ripple
//! noise = 0.1 sin(0.1 tick + 100 rx ry), added to every channel
//! ```
//! Channels are clamped to `[0, 1]` and truncated to `u8`.

use crate::record::{Resolution, StateRecord, CHANNELS};
use std::f32::consts::PI;

const NOISE_AMPLITUDE: f32 = 0.1;
const NOISE_TICK_RATE: f32 = 0.1;
const NOISE_SPATIAL_SCALE: f32 = 100.0;

/// Scalar inputs of the field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldInputs {
    /// Seconds
    pub sim_time: f64,
    /// Degrees
    pub rotation_angle: f32,
    /// Seeds the noise term
    pub tick_counter: u32,
}

impl FieldInputs {
    /// Reads the inputs from a record's current scalars.
    pub fn from_record(record: &StateRecord) -> Self {
        Self {
            sim_time: record.sim_time,
            rotation_angle: record.rotation_angle,
            tick_counter: record.tick_counter,
        }
    }
}

/// Renders the field into `out`, which must hold `resolution.payload_len()` bytes.
pub fn generate_into(inputs: &FieldInputs, resolution: Resolution, out: &mut [u8]) {
    debug_assert_eq!(out.len(), resolution.payload_len());

    let t = inputs.sim_time as f32;
    let theta = inputs.rotation_angle * PI / 180.0;
    let (sin_theta, cos_theta) = theta.sin_cos();
    let noise_phase = inputs.tick_counter as f32 * NOISE_TICK_RATE;
    let width = resolution.width as usize;

    for (index, pixel) in out.chunks_exact_mut(CHANNELS).enumerate() {
        let nx = normalize(index % width, resolution.width);
        let ny = normalize(index / width, resolution.height);

        let rx = nx * cos_theta - ny * sin_theta;
        let ry = nx * sin_theta + ny * cos_theta;

        let wave1 = (rx * 8.0 + t * 2.0).sin() * 0.5 + 0.5;
        let wave2 = (ry * 6.0 + t * 1.5).cos() * 0.5 + 0.5;
        let radial = (rx * rx + ry * ry).sqrt();
        let ripple = (radial * 10.0 - t * 4.0).sin() * 0.5 + 0.5;

        let spiral = ry.atan2(rx) + radial * 3.0 - t * 2.0;
        let spiral_pattern = spiral.sin() * 0.5 + 0.5;

        let noise = (noise_phase + rx * ry * NOISE_SPATIAL_SCALE).sin() * NOISE_AMPLITUDE;

        let r = wave1 * ripple * spiral_pattern + noise;
        let g = wave2 * (1.0 - radial * 0.3) + noise;
        let b = (wave1 + wave2) * 0.5 * ripple + noise;

        pixel[0] = quantize(r);
        pixel[1] = quantize(g);
        pixel[2] = quantize(b);
    }
}

/// Renders the field into a new buffer.
pub fn generate(inputs: &FieldInputs, resolution: Resolution) -> Vec<u8> {
    let mut out = vec![0u8; resolution.payload_len()];
    generate_into(inputs, resolution, &mut out);
    out
}

/// Regenerates a record's payload from its own scalars and marks it dirty.
pub fn regenerate(record: &mut StateRecord) {
    let inputs = FieldInputs::from_record(record);
    let resolution = record.resolution();
    generate_into(&inputs, resolution, record.payload_mut());
    record.payload_dirty = true;
}

/// Maps pixel `i` of `n` onto `[-1, 1]`. A single pixel sits at the center.
fn normalize(i: usize, n: u32) -> f32 {
    if n <= 1 {
        return 0.0;
    }
    (i as f32 / (n - 1) as f32) * 2.0 - 1.0
}

fn quantize(v: f32) -> u8 {
    // NaN collapses to 0 through the float-to-int cast
    (v.clamp(0.0, 1.0) * 255.0) as u8
}
