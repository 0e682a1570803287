//! Application orchestration for the lidar-bridge daemon
//!
//! Wires the sensor reader to the CSV recorder and the broadcast registry,
//! runs the subscriber server, and handles graceful shutdown.

use crate::config::Config;
use crate::core::sink::MeasurementSink;
use crate::core::types::LatestMeasurement;
use crate::devices::TfMiniDriver;
use crate::error::{Error, Result};
use crate::recording::CsvRecorder;
use crate::streaming::{BroadcastRegistry, ServerState, SubscriberServer};
use crate::transport::Transport;
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Why the supervision loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    /// Shutdown flag set (Ctrl-C or [`BridgeApp::shutdown_flag`])
    Requested,
    /// The subscriber server died; nobody new could subscribe
    ServerStopped,
}

/// Main application structure that owns every component
pub struct BridgeApp {
    config: Config,
    registry: Arc<BroadcastRegistry>,
    server: SubscriberServer,
    driver: TfMiniDriver,
    shutdown: Arc<AtomicBool>,
}

impl BridgeApp {
    /// Create the registry and bind the subscriber listener
    ///
    /// Nothing runs until [`start`](Self::start); a bind failure is returned
    /// here so the daemon never reports itself operational without a socket.
    pub fn new(config: Config) -> Result<Self> {
        info!("Initializing lidar bridge for sensor '{}'", config.sensor.name);

        let registry = Arc::new(BroadcastRegistry::new(config.sensor.name.clone()));
        let server = SubscriberServer::bind(
            &config.server.bind_address,
            Arc::clone(&registry),
            config.server.write_timeout(),
        )?;
        let driver = TfMiniDriver::new(config.sensor.clone());

        Ok(Self {
            config,
            registry,
            server,
            driver,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open the configured serial port and start every component
    pub fn start(&mut self) -> Result<()> {
        let sinks = self.build_sinks()?;
        self.server.start()?;
        let started = self.driver.start(sinks);
        self.stop_server_on_error(started)
    }

    /// Start every component, reading the sensor from `transport`
    pub fn start_with_transport<T: Transport + 'static>(&mut self, transport: T) -> Result<()> {
        let sinks = self.build_sinks()?;
        self.server.start()?;
        let started = self.driver.start_with_transport(transport, sinks);
        self.stop_server_on_error(started)
    }

    /// Start, then block until Ctrl-C and shut down
    ///
    /// Also returns when the subscriber server stops on its own; the
    /// listener's error is then the result.
    pub fn run(&mut self) -> Result<()> {
        self.start()?;
        self.setup_signal_handler()?;

        info!("✓ All threads started successfully");
        info!("Press Ctrl+C to stop");

        match self.supervise() {
            ExitReason::Requested => info!("Shutdown signal received, stopping threads..."),
            ExitReason::ServerStopped => {
                error!("Subscriber server stopped, shutting down");
            }
        }
        self.stop()
    }

    /// Stop the reader, then the listener, then drop every subscriber
    ///
    /// Subscribers are not drained or notified; the closed connection is
    /// their end-of-stream.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        let reader = self.driver.shutdown();
        let server = self.server.stop();
        self.log_statistics();

        let dropped = self.registry.clear();
        if dropped > 0 {
            info!("Closed {} subscriber connections", dropped);
        }
        reader.and(server)
    }

    /// Flag that stops [`run`](Self::run) when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn registry(&self) -> Arc<BroadcastRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn latest(&self) -> LatestMeasurement {
        self.driver.latest()
    }

    /// Wait for a shutdown request, logging statistics along the way
    fn supervise(&self) -> ExitReason {
        let mut last_stats = Instant::now();
        let mut reader_alive = true;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return ExitReason::Requested;
            }
            if self.server.state() == ServerState::Stopped {
                return ExitReason::ServerStopped;
            }

            if reader_alive && !self.driver.is_running() {
                reader_alive = false;
                warn!("Lidar reader stopped; subscribers stay connected but get no new data");
            }

            if last_stats.elapsed() >= STATS_INTERVAL {
                self.log_statistics();
                last_stats = Instant::now();
            }

            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn stop_server_on_error(&mut self, started: Result<()>) -> Result<()> {
        if started.is_err() {
            let _ = self.server.stop();
        }
        started
    }

    fn build_sinks(&self) -> Result<Vec<Box<dyn MeasurementSink>>> {
        let mut sinks: Vec<Box<dyn MeasurementSink>> = Vec::with_capacity(2);
        match &self.config.recording.path {
            Some(path) => sinks.push(Box::new(CsvRecorder::create(path)?)),
            None => info!("Recording disabled (no recording.path configured)"),
        }
        sinks.push(Box::new(Arc::clone(&self.registry)));
        Ok(sinks)
    }

    fn setup_signal_handler(&self) -> Result<()> {
        let shutdown = Arc::clone(&self.shutdown);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            shutdown.store(true, Ordering::Relaxed);
        })
        .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))
    }

    fn log_statistics(&self) {
        let reader = self.driver.stats();
        let registry = self.registry.stats();
        let latest = self
            .driver
            .latest()
            .get()
            .map(|m| format!("{} cm", m.distance))
            .unwrap_or_else(|| "n/a".to_string());
        info!(
            "Stats: {} measurements, {} checksum errors, {} bytes | {} subscribers ({} pruned) | latest {}",
            reader.measurements,
            reader.checksum_errors,
            reader.bytes,
            self.registry.len(),
            registry.pruned,
            latest
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::tfmini::protocol::{INIT_COMMAND, encode_frame};
    use crate::recording::CSV_HEADER;
    use crate::transport::MockTransport;
    use std::fs;
    use std::io::Read;
    use std::net::TcpStream;
    use tempfile::TempDir;

    fn test_config(recording: Option<String>) -> Config {
        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1:0".to_string();
        config.recording.path = recording;
        config
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_bytes_to_csv_and_subscriber() {
        let temp_dir = TempDir::new().unwrap();
        let csv_path = temp_dir.path().join("lidar.csv");
        let config = test_config(Some(csv_path.to_string_lossy().into_owned()));

        let mut app = BridgeApp::new(config).unwrap();
        let mock = MockTransport::new();
        app.start_with_transport(mock.clone()).unwrap();
        assert_eq!(mock.get_written(), INIT_COMMAND.to_vec());

        let mut client = TcpStream::connect(app.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let registry = app.registry();
        assert!(wait_for(|| registry.len() == 1));

        mock.inject_read(&[0xAA]);
        mock.inject_read(&encode_frame(150, 900, 2200));

        let mut buf = [0u8; 13];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"lidar1:150.0#");
        assert_eq!(app.latest().get().map(|m| m.strength), Some(900));

        app.stop().unwrap();
        assert!(registry.is_empty());
        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).unwrap(), 0);

        let contents = fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(",150,900,2200"));
    }

    #[test]
    fn test_bind_failure_prevents_startup() {
        let first = BridgeApp::new(test_config(None)).unwrap();
        let mut config = test_config(None);
        config.server.bind_address = first.local_addr().to_string();

        assert!(matches!(BridgeApp::new(config), Err(Error::Bind { .. })));
    }

    #[test]
    fn test_sensor_init_failure_is_reported() {
        let mut app = BridgeApp::new(test_config(None)).unwrap();
        let mock = MockTransport::new();
        mock.fail_next_writes(u32::MAX);

        let result = app.start_with_transport(mock);
        assert!(matches!(result, Err(Error::InitializationFailed(_))));
        app.stop().unwrap();
    }

    #[test]
    fn test_supervise_returns_when_shutdown_requested() {
        let mut app = BridgeApp::new(test_config(None)).unwrap();
        app.start_with_transport(MockTransport::new()).unwrap();

        let flag = app.shutdown_flag();
        let signaller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::Relaxed);
        });

        assert_eq!(app.supervise(), ExitReason::Requested);
        signaller.join().unwrap();
        app.stop().unwrap();
    }

    #[test]
    fn test_supervise_returns_when_server_dies() {
        let mut app = BridgeApp::new(test_config(None)).unwrap();
        app.start_with_transport(MockTransport::new()).unwrap();

        app.server.stop().unwrap();
        assert_eq!(app.supervise(), ExitReason::ServerStopped);
        app.stop().unwrap();
    }
}
