//! TFmini-style ranging lidar driver
//!
//! Owns the serial link for its whole lifetime: sends the output-mode
//! command once, then runs a reader thread that feeds every byte through the
//! [`FrameDecoder`](protocol::FrameDecoder) and hands each validated
//! measurement to the configured sinks.
//!
//! A link error ends the reader thread only. Sinks (and the subscribers
//! behind the broadcast registry) are left as they are.

pub mod protocol;
pub mod window;

use crate::config::SensorConfig;
use crate::core::sink::MeasurementSink;
use crate::core::types::{LatestMeasurement, Measurement};
use crate::error::{Error, Result};
use crate::transport::{SerialTransport, Transport};
use protocol::{DecoderStats, FrameDecoder, INIT_COMMAND};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bytes requested per serial read
const READ_CHUNK_SIZE: usize = 64;

/// Pause between initialization attempts
const INIT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Reader counters, shared with the driver handle
#[derive(Debug, Default)]
struct ReaderCounters {
    bytes: AtomicU64,
    measurements: AtomicU64,
    checksum_errors: AtomicU64,
    sink_errors: AtomicU64,
}

/// Point-in-time copy of the reader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub bytes: u64,
    pub measurements: u64,
    pub checksum_errors: u64,
    pub sink_errors: u64,
}

impl ReaderCounters {
    fn record_decoder(&self, stats: DecoderStats) {
        self.bytes.store(stats.bytes, Ordering::Relaxed);
        self.measurements.store(stats.frames, Ordering::Relaxed);
        self.checksum_errors
            .store(stats.checksum_errors, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ReaderStats {
        ReaderStats {
            bytes: self.bytes.load(Ordering::Relaxed),
            measurements: self.measurements.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

/// Ranging lidar driver
pub struct TfMiniDriver {
    config: SensorConfig,
    shutdown: Arc<AtomicBool>,
    reader_handle: Option<JoinHandle<Result<()>>>,
    counters: Arc<ReaderCounters>,
    latest: LatestMeasurement,
}

impl TfMiniDriver {
    /// Create a new driver; nothing is opened until [`start`](Self::start)
    pub fn new(config: SensorConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            reader_handle: None,
            counters: Arc::new(ReaderCounters::default()),
            latest: LatestMeasurement::new(),
        }
    }

    /// Open the configured serial port and start reading
    pub fn start(&mut self, sinks: Vec<Box<dyn MeasurementSink>>) -> Result<()> {
        let transport = SerialTransport::open(
            &self.config.port,
            self.config.baud_rate,
            self.config.read_timeout(),
        )?;
        self.start_with_transport(transport, sinks)
    }

    /// Initialize the sensor over `transport` and spawn the reader thread
    ///
    /// Fails without spawning anything if the initialization command cannot
    /// be written.
    pub fn start_with_transport<T: Transport + 'static>(
        &mut self,
        mut transport: T,
        sinks: Vec<Box<dyn MeasurementSink>>,
    ) -> Result<()> {
        if self.reader_handle.is_some() {
            return Err(Error::Other("reader already started".to_string()));
        }

        send_init_command(&mut transport, self.config.init_retries)?;

        let shutdown = Arc::clone(&self.shutdown);
        let counters = Arc::clone(&self.counters);
        let latest = self.latest.clone();

        self.reader_handle = Some(
            thread::Builder::new()
                .name("tfmini-reader".to_string())
                .spawn(move || reader_loop(transport, shutdown, sinks, latest, counters))
                .map_err(|e| Error::Other(format!("Failed to spawn reader thread: {}", e)))?,
        );

        log::info!("Lidar reader started on {}", self.config.port);
        Ok(())
    }

    /// Handle to the most recent measurement
    pub fn latest(&self) -> LatestMeasurement {
        self.latest.clone()
    }

    pub fn stats(&self) -> ReaderStats {
        self.counters.snapshot()
    }

    /// True while the reader thread is alive
    pub fn is_running(&self) -> bool {
        self.reader_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the reader thread and wait for it
    ///
    /// The reader checks the stop flag between reads, so this returns within
    /// one serial read timeout.
    pub fn shutdown(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.reader_handle.take() {
            log::info!("Shutting down lidar reader...");
            // A link error was already logged by the reader itself
            if handle.join().is_err() {
                return Err(Error::ThreadPanic);
            }
            log::info!("Lidar reader shutdown complete");
        }
        Ok(())
    }
}

impl Drop for TfMiniDriver {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Write the output-mode command, tolerating up to `retries` failed writes
///
/// A retry resumes after the bytes already accepted, so the sensor sees the
/// command exactly once and never a truncated copy followed by a full one.
fn send_init_command<T: Transport>(transport: &mut T, retries: u32) -> Result<()> {
    let attempts = retries + 1;
    let mut failures = 0u32;
    let mut sent = 0usize;

    while sent < INIT_COMMAND.len() {
        let error = match transport.write(&INIT_COMMAND[sent..]) {
            Ok(0) => Error::Other("serial port accepted no bytes".to_string()),
            Ok(n) => {
                sent += n;
                continue;
            }
            Err(e) => e,
        };

        failures += 1;
        log::warn!(
            "Sensor initialization attempt {}/{} failed after {}/{} bytes: {}",
            failures,
            attempts,
            sent,
            INIT_COMMAND.len(),
            error
        );
        if failures >= attempts {
            return Err(Error::InitializationFailed(format!(
                "could not write initialization command after {} attempts: {}",
                attempts, error
            )));
        }
        thread::sleep(INIT_RETRY_DELAY);
    }

    transport.flush()?;
    log::debug!(
        "Sensor initialization command sent ({} failed attempts)",
        failures
    );
    Ok(())
}

/// Reader loop - decodes bytes until stopped or the link fails
fn reader_loop<T: Transport>(
    mut transport: T,
    shutdown: Arc<AtomicBool>,
    mut sinks: Vec<Box<dyn MeasurementSink>>,
    latest: LatestMeasurement,
    counters: Arc<ReaderCounters>,
) -> Result<()> {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; READ_CHUNK_SIZE];

    while !shutdown.load(Ordering::Relaxed) {
        let n = match transport.read(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                log::error!("Serial communication error: {}", e);
                return Err(Error::LinkLost(e.to_string()));
            }
        };

        for &byte in &buf[..n] {
            if let Some(measurement) = decoder.feed(byte) {
                latest.set(measurement);
                dispatch(&mut sinks, &measurement, &counters);
            }
        }
        counters.record_decoder(decoder.stats());
    }

    log::info!("Lidar reader thread exiting");
    Ok(())
}

fn dispatch(
    sinks: &mut [Box<dyn MeasurementSink>],
    measurement: &Measurement,
    counters: &ReaderCounters,
) {
    log::trace!(
        "Measurement: distance={} strength={} temp={}",
        measurement.distance,
        measurement.strength,
        measurement.temperature
    );
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.accept(measurement) {
            counters.sink_errors.fetch_add(1, Ordering::Relaxed);
            log::warn!("{} rejected measurement: {}", sink.name(), e);
        }
    }
}
