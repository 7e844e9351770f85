//! Worker Statistics

use std::sync::atomic::{AtomicUsize, Ordering};

/// Live counters shared between a worker thread and its observers.
///
/// All failure behavior of the pipeline is visible here; nothing is
/// propagated as an error past the worker loop.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Transient source read errors (each one retried)
    pub(crate) read_errors: AtomicUsize,
    /// Terminal end-of-stream reports from the source
    pub(crate) eos_count: AtomicUsize,
    /// Bytes shed by the stream buffer's drop-oldest policy
    pub(crate) stream_overflow_bytes: AtomicUsize,
    /// Mirror of the parser's CRC error counter
    pub(crate) parser_errors: AtomicUsize,
    /// Mirror of the parser's dropped-frame counter
    pub(crate) dropped_frames: AtomicUsize,
}

impl WorkerStats {
    /// Copy the current counter values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            read_errors: self.read_errors.load(Ordering::Relaxed),
            eos_count: self.eos_count.load(Ordering::Relaxed),
            stream_overflow_bytes: self.stream_overflow_bytes.load(Ordering::Relaxed),
            parser_errors: self.parser_errors.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a worker's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub read_errors: usize,
    pub eos_count: usize,
    pub stream_overflow_bytes: usize,
    pub parser_errors: usize,
    pub dropped_frames: usize,
}
