//! Sensor Fleet Management
//!
//! Owns the shared measurement queue and the per-sensor workers,
//! instantiating the right source/parser pair for each registered
//! sensor kind. Workers never learn which concrete transport or
//! protocol they are driving.

use std::sync::Arc;

#[cfg(target_os = "linux")]
use frame_parser::UartFrameParser;
use frame_parser::{FixedFrameParser, FrameParser, Measurement};
use measurement_queue::{GlobalQueue, QueueError};
#[cfg(target_os = "linux")]
use sensor_worker::{SerialByteSource, SerialConfig, SerialError};
use sensor_worker::{ByteSource, MemoryByteSource, SensorWorker, StatsSnapshot, WorkerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Fleet construction and registration errors
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Shared queue could not be built
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Serial sensor could not be opened
    #[cfg(target_os = "linux")]
    #[error("failed to open serial sensor: {0}")]
    Serial(#[from] SerialError),
}

/// Transport and protocol kind for a registered sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorKind {
    /// Serial line speaking the sync/length/payload/CRC protocol
    #[cfg(target_os = "linux")]
    Uart(SerialConfig),
    /// In-memory byte ramp chopped into fixed-size frames
    Fake,
}

/// Per-sensor registration parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Transport and protocol selection
    pub kind: SensorKind,
    /// Requested stream buffer capacity for the worker
    pub stream_buffer_capacity: usize,
}

/// Facade over the shared queue and the worker fleet
pub struct SensorManager {
    /// Next id handed out by `add_sensor`
    next_sensor_id: u64,
    queue: Arc<GlobalQueue<Measurement>>,
    workers: Vec<SensorWorker>,
}

impl SensorManager {
    /// Create a manager around a fresh queue of the given capacity.
    pub fn new(queue_capacity: usize) -> Result<Self, ManagerError> {
        Ok(Self {
            next_sensor_id: 0,
            queue: Arc::new(GlobalQueue::new(queue_capacity)?),
            workers: Vec::new(),
        })
    }

    /// Shared handle to the fused measurement channel
    pub fn queue(&self) -> Arc<GlobalQueue<Measurement>> {
        Arc::clone(&self.queue)
    }

    /// Register a sensor and return its assigned id.
    pub fn add_sensor(&mut self, config: SensorConfig) -> Result<u64, ManagerError> {
        let (source, parser): (Arc<dyn ByteSource>, Box<dyn FrameParser>) = match &config.kind {
            #[cfg(target_os = "linux")]
            SensorKind::Uart(serial) => (
                Arc::new(SerialByteSource::open(serial)?),
                Box::new(UartFrameParser::new()),
            ),
            SensorKind::Fake => (
                Arc::new(MemoryByteSource::ramp()),
                Box::new(FixedFrameParser::new()),
            ),
        };

        let sensor_id = self.next_sensor_id;
        self.next_sensor_id += 1;

        self.workers.push(SensorWorker::new(
            WorkerConfig {
                sensor_id,
                stream_buffer_capacity: config.stream_buffer_capacity,
            },
            source,
            parser,
            Arc::clone(&self.queue),
        ));
        info!(sensor_id, kind = ?config.kind, "sensor registered");
        Ok(sensor_id)
    }

    /// Start every registered worker.
    pub fn start_all(&mut self) {
        info!(sensors = self.workers.len(), "starting sensor fleet");
        for worker in &mut self.workers {
            worker.start();
        }
    }

    /// Stop every worker, then shut the queue down so consumers drain
    /// what remains and exit.
    pub fn stop_all(&mut self) {
        info!(sensors = self.workers.len(), "stopping sensor fleet");
        for worker in &mut self.workers {
            worker.stop();
        }
        self.queue.shutdown();
    }

    /// Number of registered sensors
    pub fn sensor_count(&self) -> usize {
        self.workers.len()
    }

    /// Counter snapshots for every worker, keyed by sensor id
    pub fn worker_stats(&self) -> Vec<(u64, StatsSnapshot)> {
        self.workers
            .iter()
            .map(|w| (w.sensor_id(), w.stats()))
            .collect()
    }
}

/// Install the fmt tracing subscriber for binaries.
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sensor() -> SensorConfig {
        SensorConfig {
            kind: SensorKind::Fake,
            stream_buffer_capacity: 256,
        }
    }

    #[test]
    fn test_ids_are_assigned_in_registration_order() {
        let mut manager = SensorManager::new(8).unwrap();
        assert_eq!(manager.add_sensor(fake_sensor()).unwrap(), 0);
        assert_eq!(manager.add_sensor(fake_sensor()).unwrap(), 1);
        assert_eq!(manager.add_sensor(fake_sensor()).unwrap(), 2);
        assert_eq!(manager.sensor_count(), 3);
    }

    #[test]
    fn test_zero_queue_capacity_is_rejected() {
        assert!(matches!(
            SensorManager::new(0),
            Err(ManagerError::Queue(QueueError::ZeroCapacity))
        ));
    }

    #[test]
    fn test_fake_fleet_end_to_end() {
        let mut manager = SensorManager::new(128).unwrap();
        manager.add_sensor(fake_sensor()).unwrap();
        manager.add_sensor(fake_sensor()).unwrap();

        let queue = manager.queue();
        manager.start_all();

        // Each fake sensor ramps 256 bytes into 32 fixed-size frames.
        let mut per_sensor = [0usize; 2];
        for _ in 0..64 {
            let m = queue.pop().expect("measurement");
            per_sensor[m.sensor_id as usize] += 1;
        }
        assert_eq!(per_sensor, [32, 32]);

        // Let the workers drain their ramps and block in read.
        std::thread::sleep(std::time::Duration::from_millis(50));
        manager.stop_all();
        assert!(queue.pop().is_none());

        for (_, stats) in manager.worker_stats() {
            assert_eq!(stats.eos_count, 1);
            assert_eq!(stats.read_errors, 0);
        }
    }

    #[test]
    fn test_stop_all_shuts_the_queue() {
        let mut manager = SensorManager::new(8).unwrap();
        let queue = manager.queue();
        manager.stop_all();
        assert!(!queue.push(Measurement::default()));
    }
}
