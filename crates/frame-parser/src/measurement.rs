//! Measurement Record

use std::time::Instant;

/// A validated sensor payload with its provenance.
///
/// The parser fills in `payload` only; `sensor_id`, `sequence`, and
/// `timestamp` are stamped by the worker when the frame completes.
#[derive(Debug, Clone, Default)]
pub struct Measurement {
    /// Validated payload bytes
    pub payload: Vec<u8>,
    /// Identifier of the producing sensor
    pub sensor_id: u64,
    /// Per-sensor sequence number
    pub sequence: u64,
    /// Monotonic capture time, set when the frame completed
    pub timestamp: Option<Instant>,
}

impl Measurement {
    /// Create a measurement holding only a payload
    pub fn from_payload(payload: Vec<u8>) -> Self {
        Self {
            payload,
            ..Self::default()
        }
    }
}
