//! Rendering collaborators.
//!
//! The core never rasterizes or talks to a GPU. It hands finished data to
//! these traits; the binary plugs in whatever backend it has.

use crate::record::Resolution;
use nalgebra::Vector3;

/// Pixel layout of uploaded payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// R, G, B; one unsigned byte each
    Rgb8,
}

/// Receives payload uploads (a 2D texture in a real renderer).
pub trait TextureSink {
    fn upload(&mut self, pixels: &[u8], resolution: Resolution, format: PixelFormat);
}

/// Receives trajectory polylines to turn into strip geometry.
pub trait GeometrySink {
    fn build_strip(&mut self, points: &[Vector3<f64>], width: f64);
}
