//! Configuration for lidar-bridge
//!
//! Loads configuration from a TOML file. Every section has defaults for a single
//! USB-serial sensor, so a partial file is enough.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub server: ServerConfig,
    pub recording: RecordingConfig,
    pub logging: LoggingConfig,
}

/// Serial sensor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Source name prefixed to every wire message (e.g. `lidar1`)
    pub name: String,
    /// Serial device path
    pub port: String,
    pub baud_rate: u32,
    /// Serial read timeout; the reader re-checks its stop flag at this interval
    pub read_timeout_ms: u64,
    /// Attempts at writing the initialization command before giving up
    pub init_retries: u32,
}

/// Subscriber server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address for subscribers
    ///
    /// Examples:
    /// - `0.0.0.0:12345` - All interfaces
    /// - `127.0.0.1:12345` - Localhost only
    pub bind_address: String,
    /// Per-subscriber write timeout. A subscriber that cannot take a
    /// measurement within this window is dropped.
    pub write_timeout_ms: u64,
}

/// Measurement log configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// CSV file to append measurements to. Recording is disabled when unset.
    pub path: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: "lidar1".to_string(),
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 1000,
            init_retries: 3,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:12345".to_string(),
            write_timeout_ms: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SensorConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl ServerConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use lidar_bridge::config::Config;
    ///
    /// let config = Config::load("lidar-bridge.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the rest of the daemon cannot work with
    pub fn validate(&self) -> Result<()> {
        let name = &self.sensor.name;
        if name.is_empty() || name.contains(':') || name.contains('#') {
            return Err(Error::Config(format!(
                "sensor.name must be non-empty and free of ':' and '#', got {:?}",
                name
            )));
        }
        if self.sensor.baud_rate == 0 {
            return Err(Error::Config("sensor.baud_rate must be non-zero".into()));
        }
        if self.server.write_timeout_ms == 0 {
            // A zero timeout means "block forever" to the socket layer
            return Err(Error::Config(
                "server.write_timeout_ms must be non-zero".into(),
            ));
        }
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|e| {
                Error::Config(format!(
                    "server.bind_address {:?} is invalid: {}",
                    self.server.bind_address, e
                ))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sensor.name, "lidar1");
        assert_eq!(config.sensor.port, "/dev/ttyUSB0");
        assert_eq!(config.sensor.baud_rate, 115200);
        assert_eq!(config.server.bind_address, "0.0.0.0:12345");
        assert_eq!(config.server.write_timeout(), Duration::from_millis(100));
        assert!(config.recording.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[sensor]"));
        assert!(toml_string.contains("[server]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("baud_rate = 115200"));
        assert!(toml_string.contains("port = \"/dev/ttyUSB0\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[sensor]
name = "front"
port = "/dev/ttyS1"

[server]
bind_address = "127.0.0.1:4000"

[recording]
path = "front.csv"

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.sensor.name, "front");
        assert_eq!(config.sensor.port, "/dev/ttyS1");
        // Unspecified keys fall back to defaults
        assert_eq!(config.sensor.baud_rate, 115200);
        assert_eq!(config.server.write_timeout_ms, 100);
        assert_eq!(config.recording.path.as_deref(), Some("front.csv"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.sensor.name = "a:b".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.server.write_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bridge.toml");

        let mut config = Config::default();
        config.sensor.name = "rear".to_string();
        config.recording.path = Some("rear.csv".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sensor.name, "rear");
        assert_eq!(loaded.recording.path.as_deref(), Some("rear.csv"));
    }
}
