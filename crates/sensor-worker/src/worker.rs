//! Sensor Worker Implementation
//!
//! The run loop: blocking-read from the source into a scratch buffer,
//! append to the drop-oldest stream buffer, drain it in parser-sized
//! chunks, and push completed measurements into the shared queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use frame_parser::{FrameParser, Measurement};
use measurement_queue::GlobalQueue;
use serde::{Deserialize, Serialize};
use stream_buffer::StreamBuffer;
use tracing::{debug, error, info, warn};

use crate::source::ByteSource;
use crate::stats::{StatsSnapshot, WorkerStats};

/// Upper bound on a single source read, in bytes
pub const MAX_SOURCE_READ: usize = 256;
/// Bytes handed to the parser per feed call
pub const PARSER_CHUNK_SIZE: usize = 64;

/// Worker parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Identifier stamped on every measurement this worker emits
    pub sensor_id: u64,
    /// Requested stream buffer capacity; raised to at least
    /// `PARSER_CHUNK_SIZE` so a full parser chunk always fits
    pub stream_buffer_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sensor_id: 0,
            stream_buffer_capacity: MAX_SOURCE_READ,
        }
    }
}

/// Pipeline pieces owned by the worker thread while it runs.
///
/// Handed back through the join handle on exit so a stopped worker can
/// be started again.
struct WorkerCore {
    stream: StreamBuffer,
    parser: Box<dyn FrameParser>,
    /// Next sequence number to stamp
    sequence: u64,
}

/// Everything the run loop shares with the controlling thread
struct RunContext {
    sensor_id: u64,
    source: Arc<dyn ByteSource>,
    queue: Arc<GlobalQueue<Measurement>>,
    stats: Arc<WorkerStats>,
    stop_requested: Arc<AtomicBool>,
}

/// Per-sensor ingestion task.
///
/// `start` and `stop` must be driven from a single control thread;
/// everything the worker thread touches is either owned by it or
/// shared through atomics and the queue's internal lock.
pub struct SensorWorker {
    sensor_id: u64,
    source: Arc<dyn ByteSource>,
    queue: Arc<GlobalQueue<Measurement>>,
    stats: Arc<WorkerStats>,
    stop_requested: Arc<AtomicBool>,
    started: bool,
    core: Option<WorkerCore>,
    handle: Option<JoinHandle<WorkerCore>>,
}

impl SensorWorker {
    /// Wire a source and parser to the shared queue.
    pub fn new(
        config: WorkerConfig,
        source: Arc<dyn ByteSource>,
        parser: Box<dyn FrameParser>,
        queue: Arc<GlobalQueue<Measurement>>,
    ) -> Self {
        let capacity = config.stream_buffer_capacity.max(PARSER_CHUNK_SIZE);
        Self {
            sensor_id: config.sensor_id,
            source,
            queue,
            stats: Arc::new(WorkerStats::default()),
            stop_requested: Arc::new(AtomicBool::new(false)),
            started: false,
            core: Some(WorkerCore {
                stream: StreamBuffer::new(capacity),
                parser,
                sequence: 0,
            }),
            handle: None,
        }
    }

    /// Identifier stamped on this worker's measurements
    pub fn sensor_id(&self) -> u64 {
        self.sensor_id
    }

    /// Current counter values
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Spawn the worker thread.
    ///
    /// Returns `false` without effect if the worker is already started.
    pub fn start(&mut self) -> bool {
        if self.started {
            return false;
        }
        let core = match self.core.take() {
            Some(core) => core,
            None => return false,
        };

        self.started = true;
        self.stop_requested.store(false, Ordering::SeqCst);

        let ctx = RunContext {
            sensor_id: self.sensor_id,
            source: Arc::clone(&self.source),
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
            stop_requested: Arc::clone(&self.stop_requested),
        };
        self.handle = Some(thread::spawn(move || run(ctx, core)));
        info!(sensor_id = self.sensor_id, "sensor worker started");
        true
    }

    /// Request a stop, unblock the source, and join the worker thread.
    ///
    /// Idempotent; returns immediately if the worker was never started
    /// or another stop already claimed the flag.
    pub fn stop(&mut self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) || !self.started {
            return;
        }

        if let Err(e) = self.source.stop_request() {
            warn!(sensor_id = self.sensor_id, error = %e, "source unblock failed");
        }

        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(core) => self.core = Some(core),
                Err(_) => error!(sensor_id = self.sensor_id, "sensor worker thread panicked"),
            }
        }
        self.started = false;
        info!(sensor_id = self.sensor_id, "sensor worker stopped");
    }
}

impl Drop for SensorWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn mirror_parser_counters(stats: &WorkerStats, parser: &dyn FrameParser) {
    stats
        .parser_errors
        .store(parser.error_count(), Ordering::Relaxed);
    stats
        .dropped_frames
        .store(parser.dropped_frames(), Ordering::Relaxed);
}

/// Worker thread body. Exits when a stop is requested, the source
/// reports end-of-stream, or the queue refuses a push after shutdown.
fn run(ctx: RunContext, mut core: WorkerCore) -> WorkerCore {
    let mut scratch = vec![0u8; MAX_SOURCE_READ.min(core.stream.capacity())];
    let mut chunk = [0u8; PARSER_CHUNK_SIZE];

    while !ctx.stop_requested.load(Ordering::SeqCst) {
        let n = match ctx.source.read(&mut scratch) {
            Ok(0) => {
                ctx.stats.eos_count.fetch_add(1, Ordering::Relaxed);
                debug!(sensor_id = ctx.sensor_id, "source reported end-of-stream");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                ctx.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                warn!(sensor_id = ctx.sensor_id, error = %e, "transient source read error");
                continue;
            }
        };

        let appended = core.stream.append(&scratch[..n]);
        if appended < n {
            ctx.stats
                .stream_overflow_bytes
                .fetch_add(n - appended, Ordering::Relaxed);
        }

        while core.stream.available() > 0 {
            let take = core.stream.available().min(PARSER_CHUNK_SIZE);
            if !core.stream.extract(&mut chunk[..take]) {
                // Unreachable: `take` never exceeds what is available.
                error!(sensor_id = ctx.sensor_id, "stream buffer refused a sized extract");
                return core;
            }

            core.parser.feed_bytes(&chunk[..take]);

            while core.parser.has_frame() {
                let mut m = core.parser.extract_frame();
                m.sensor_id = ctx.sensor_id;
                m.sequence = core.sequence;
                m.timestamp = Some(Instant::now());
                core.sequence += 1;

                if !ctx.queue.push(m) {
                    debug!(sensor_id = ctx.sensor_id, "queue shut down, worker exiting");
                    mirror_parser_counters(&ctx.stats, core.parser.as_ref());
                    return core;
                }
            }

            mirror_parser_counters(&ctx.stats, core.parser.as_ref());
        }
    }

    mirror_parser_counters(&ctx.stats, core.parser.as_ref());
    core
}
