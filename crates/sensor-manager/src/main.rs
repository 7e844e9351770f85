//! Sensor Pipeline Demo - Main Entry Point
//!
//! Runs a fake sensor through the full pipeline for a moment: one
//! consumer drains the shared queue while the worker ingests, then
//! everything is stopped and the consumer drains the remainder.

use std::thread;
use std::time::Duration;

use sensor_manager::{init_logging, SensorConfig, SensorKind, SensorManager};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("=== Sensor Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let mut manager = SensorManager::new(64)?;
    manager.add_sensor(SensorConfig {
        kind: SensorKind::Fake,
        stream_buffer_capacity: 256,
    })?;

    let queue = manager.queue();
    let consumer = thread::spawn(move || {
        let mut received = 0usize;
        while let Some(m) = queue.pop() {
            received += 1;
            info!(
                sensor_id = m.sensor_id,
                sequence = m.sequence,
                payload = ?m.payload,
                "measurement"
            );
        }
        received
    });

    manager.start_all();
    thread::sleep(Duration::from_millis(200));
    manager.stop_all();

    let received = consumer.join().expect("consumer thread panicked");
    info!(received, "pipeline drained, shutting down");

    for (sensor_id, stats) in manager.worker_stats() {
        info!(sensor_id, ?stats, "worker counters");
    }

    Ok(())
}
