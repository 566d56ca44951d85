//! Headless stand-ins for the renderer.
//!
//! A real deployment uploads the payload to a GPU texture and builds ribbon
//! geometry from the trajectory. This process has no window, so it records
//! what it would have drawn and logs it.

use nalgebra::Vector3;
use statecast_core::{GeometrySink, PixelFormat, Resolution, TextureSink};
use tracing::{debug, trace};

/// Counts texture uploads and keeps a CRC-32 of the last one.
#[derive(Debug, Default)]
pub struct LoggingTexture {
    pub uploads: u64,
    pub last_checksum: u32,
}

impl TextureSink for LoggingTexture {
    fn upload(&mut self, pixels: &[u8], resolution: Resolution, format: PixelFormat) {
        self.uploads += 1;
        self.last_checksum = crc32fast::hash(pixels);
        debug!(
            "texture upload #{}: {} {:?} ({} bytes, checksum {:08x})",
            self.uploads,
            resolution,
            format,
            pixels.len(),
            self.last_checksum
        );
    }
}

/// Keeps the extent of the last trajectory strip.
#[derive(Debug, Default)]
pub struct LoggingGeometry {
    pub strips: u64,
    pub last_points: usize,
    pub last_extent: f64,
}

impl GeometrySink for LoggingGeometry {
    fn build_strip(&mut self, points: &[Vector3<f64>], width: f64) {
        self.strips += 1;
        self.last_points = points.len();
        self.last_extent = points.iter().map(|p| p.norm()).fold(0.0, f64::max);
        trace!(
            "strip #{}: {} points, width {:.3}, extent {:.2}",
            self.strips,
            points.len(),
            width,
            self.last_extent
        );
    }
}
