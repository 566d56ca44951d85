//! The replicated state record.
//!
//! One `StateRecord` is everything a consumer needs to reproduce what the
//! producer shows: a handful of scalars plus an RGB raster. The record is
//! allocated once from a `Resolution` and never resized; producers write its
//! fields in place and consumers overwrite their copy wholesale on receipt.
//!
//! # Wire layout
//!
//! Fixed size, little endian, no framing:
//!
//! ```text
//! 0   f64  sim_time
//! 8   f32  rotation_angle (degrees, [0, 360))
//! 12  u32  tick_counter
//! 16  u8   payload_dirty (0 or 1)
//! 17  ..   payload, width * height * 3 bytes (RGB, row major)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes per pixel (R, G, B).
pub const CHANNELS: usize = 3;

/// Size of the scalar header in front of the payload.
pub const HEADER_LEN: usize = 17;

/// Errors raised while building or decoding records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// A resolution with a zero dimension
    #[error("Invalid resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    /// Frame length does not match this record's layout
    #[error("Record size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Raster dimensions shared by every node in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawResolution")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Unchecked wire form; deserialization goes through `Resolution::new`.
#[derive(Deserialize)]
struct RawResolution {
    width: u32,
    height: u32,
}

impl TryFrom<RawResolution> for Resolution {
    type Error = RecordError;

    fn try_from(raw: RawResolution) -> Result<Self, Self::Error> {
        Resolution::new(raw.width, raw.height)
    }
}

impl Resolution {
    /// Creates a resolution, rejecting zero-sized dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self, RecordError> {
        if width == 0 || height == 0 {
            return Err(RecordError::InvalidResolution { width, height });
        }
        Ok(Self { width, height })
    }

    /// Creates a `size x size` resolution.
    pub fn square(size: u32) -> Result<Self, RecordError> {
        Self::new(size, size)
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> usize {
        self.pixel_count() * CHANNELS
    }

    /// Encoded record size in bytes.
    pub fn record_len(&self) -> usize {
        HEADER_LEN + self.payload_len()
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1080,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The unit of replication.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    /// Simulation clock in seconds, advanced by the producer only
    pub sim_time: f64,

    /// Rotation in degrees, kept in `[0, 360)`
    pub rotation_angle: f32,

    /// Incremented once per producer tick; the change signal
    pub tick_counter: u32,

    /// Set whenever the payload is regenerated. Advisory only: nothing clears
    /// it, consumers use `tick_counter` to detect change.
    pub payload_dirty: bool,

    resolution: Resolution,
    payload: Box<[u8]>,
}

impl StateRecord {
    /// Allocates a zeroed record for the given resolution.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            sim_time: 0.0,
            rotation_angle: 0.0,
            tick_counter: 0,
            payload_dirty: false,
            resolution,
            payload: vec![0u8; resolution.payload_len()].into_boxed_slice(),
        }
    }

    /// The resolution this record was allocated for.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// The RGB raster.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Mutable access to the raster. The length is fixed.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Encoded size of this record.
    pub fn encoded_len(&self) -> usize {
        self.resolution.record_len()
    }

    /// Zeroes the scalar simulation state. The payload is left untouched.
    pub fn reset_scalars(&mut self) {
        self.sim_time = 0.0;
        self.rotation_angle = 0.0;
        self.tick_counter = 0;
    }

    /// Appends the wire encoding to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.encoded_len());
        buf.extend_from_slice(&self.sim_time.to_le_bytes());
        buf.extend_from_slice(&self.rotation_angle.to_le_bytes());
        buf.extend_from_slice(&self.tick_counter.to_le_bytes());
        buf.push(self.payload_dirty as u8);
        buf.extend_from_slice(&self.payload);
    }

    /// Returns the wire encoding.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Overwrites every field from an encoded frame.
    ///
    /// The payload is copied into the existing buffer. On error the record is
    /// left unchanged.
    pub fn decode_from(&mut self, bytes: &[u8]) -> Result<(), RecordError> {
        let expected = self.encoded_len();
        if bytes.len() != expected {
            return Err(RecordError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let (header, payload) = bytes.split_at(HEADER_LEN);
        self.sim_time = f64::from_le_bytes(le_array(&header[0..8]));
        self.rotation_angle = f32::from_le_bytes(le_array(&header[8..12]));
        self.tick_counter = u32::from_le_bytes(le_array(&header[12..16]));
        self.payload_dirty = header[16] != 0;
        self.payload.copy_from_slice(payload);
        Ok(())
    }

    /// Decodes a fresh record of the given resolution.
    pub fn from_bytes(resolution: Resolution, bytes: &[u8]) -> Result<Self, RecordError> {
        let mut record = Self::new(resolution);
        record.decode_from(bytes)?;
        Ok(record)
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_sizes() {
        let res = Resolution::new(4, 2).unwrap();
        assert_eq!(res.pixel_count(), 8);
        assert_eq!(res.payload_len(), 24);
        assert_eq!(res.record_len(), 41);
        assert_eq!(Resolution::default().payload_len(), 1080 * 1080 * 3);
    }

    #[test]
    fn test_zero_resolution_rejected() {
        assert_eq!(
            Resolution::new(0, 10),
            Err(RecordError::InvalidResolution { width: 0, height: 10 })
        );
        assert!(Resolution::square(0).is_err());
    }

    #[test]
    fn test_deserialized_resolution_is_validated() {
        let res: Resolution = serde_json::from_str(r#"{"width":4,"height":2}"#).unwrap();
        assert_eq!(res, Resolution::new(4, 2).unwrap());

        let err = serde_json::from_str::<Resolution>(r#"{"width":0,"height":2}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid resolution 0x2"));
    }

    #[test]
    fn test_new_record_is_zeroed() {
        let record = StateRecord::new(Resolution::square(3).unwrap());
        assert_eq!(record.tick_counter, 0);
        assert!(!record.payload_dirty);
        assert_eq!(record.payload().len(), 27);
        assert!(record.payload().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_header_layout() {
        let mut record = StateRecord::new(Resolution::square(1).unwrap());
        record.sim_time = 1.0;
        record.rotation_angle = 2.0;
        record.tick_counter = 0x0102_0304;
        record.payload_dirty = true;
        record.payload_mut().copy_from_slice(&[7, 8, 9]);

        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN + 3);
        assert_eq!(&bytes[0..8], &1.0f64.to_le_bytes());
        assert_eq!(&bytes[8..12], &2.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &[4, 3, 2, 1]);
        assert_eq!(bytes[16], 1);
        assert_eq!(&bytes[17..], &[7, 8, 9]);
    }

    #[test]
    fn test_decode_overwrites_wholesale() {
        let res = Resolution::square(2).unwrap();
        let mut sent = StateRecord::new(res);
        sent.sim_time = 12.5;
        sent.rotation_angle = 270.0;
        sent.tick_counter = 42;
        sent.payload_dirty = true;
        sent.payload_mut().iter_mut().enumerate().for_each(|(i, b)| *b = i as u8);

        let mut local = StateRecord::new(res);
        local.tick_counter = 99;
        local.decode_from(&sent.to_bytes()).unwrap();
        assert_eq!(local, sent);
    }

    #[test]
    fn test_decode_size_mismatch_leaves_record_untouched() {
        let mut local = StateRecord::new(Resolution::square(2).unwrap());
        local.tick_counter = 5;
        let other = StateRecord::new(Resolution::square(3).unwrap());

        let err = local.decode_from(&other.to_bytes()).unwrap_err();
        assert_eq!(
            err,
            RecordError::SizeMismatch {
                expected: HEADER_LEN + 12,
                actual: HEADER_LEN + 27,
            }
        );
        assert_eq!(local.tick_counter, 5);
    }

    #[test]
    fn test_reset_scalars_keeps_payload() {
        let mut record = StateRecord::new(Resolution::square(1).unwrap());
        record.sim_time = 3.0;
        record.rotation_angle = 45.0;
        record.tick_counter = 9;
        record.payload_mut()[0] = 200;

        record.reset_scalars();
        assert_eq!(record.sim_time, 0.0);
        assert_eq!(record.rotation_angle, 0.0);
        assert_eq!(record.tick_counter, 0);
        assert_eq!(record.payload()[0], 200);
    }
}
