//! Sensor Worker
//!
//! Each worker owns one blocking byte source and one frame parser, moves
//! validated measurements into the shared global queue from a dedicated
//! thread, and supports cooperative two-channel stop: an atomic flag plus
//! an out-of-band unblock of the source's blocking read.

#[cfg(target_os = "linux")]
mod serial;
mod source;
mod stats;
mod worker;

#[cfg(target_os = "linux")]
pub use serial::{DataBits, Parity, SerialByteSource, SerialConfig, SerialError, StopBits};
pub use source::{ByteSource, MemoryByteSource};
pub use stats::{StatsSnapshot, WorkerStats};
pub use worker::{SensorWorker, WorkerConfig, MAX_SOURCE_READ, PARSER_CHUNK_SIZE};
