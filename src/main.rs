//! lidar-bridge - serial ranging lidar daemon
//!
//! Reads the sensor on a serial port, appends measurements to a CSV file and
//! streams `<name>:<distance>#` units to every connected TCP client.

use lidar_bridge::app::BridgeApp;
use lidar_bridge::config::Config;
use lidar_bridge::error::Result;
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "/etc/lidar-bridge.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `lidar-bridge <path>` (positional)
/// - `lidar-bridge --config <path>` (flag-based)
/// - `lidar-bridge -c <path>` (short flag)
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

/// Explicit paths must load; the default path is optional
fn load_config() -> Result<(Config, String)> {
    match parse_config_path() {
        Some(path) => Ok((Config::load(&path)?, path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok((
            Config::load(DEFAULT_CONFIG_PATH)?,
            DEFAULT_CONFIG_PATH.to_string(),
        )),
        None => Ok((Config::default(), "built-in defaults".to_string())),
    }
}

fn main() -> Result<()> {
    let (config, source) = load_config()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("lidar-bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    if source == "built-in defaults" {
        log::warn!("No config file found, using built-in defaults");
    } else {
        log::info!("Using config: {}", source);
    }
    log::info!(
        "Sensor: {} on {} @ {} baud",
        config.sensor.name,
        config.sensor.port,
        config.sensor.baud_rate
    );

    let mut app = BridgeApp::new(config)?;
    app.run()?;

    log::info!("lidar-bridge stopped");
    Ok(())
}
