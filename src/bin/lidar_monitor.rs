//! Text monitor for a running lidar-bridge
//!
//! Connects as a subscriber and prints every received distance with the
//! seconds elapsed since connecting.
//!
//! Usage: `lidar-monitor [host:port]` (default `127.0.0.1:12345`)

use lidar_bridge::error::{Error, Result};
use lidar_bridge::streaming::{DistanceHistory, StreamClient};
use std::env;
use std::time::{Duration, Instant};

const DEFAULT_ADDRESS: &str = "127.0.0.1:12345";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let address = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

    log::info!("Connecting to {}", address);
    let mut client = StreamClient::connect(address.as_str(), Duration::from_millis(500))?;
    let mut history = DistanceHistory::default();
    let start = Instant::now();

    loop {
        let messages = match client.recv() {
            Ok(messages) => messages,
            Err(Error::Disconnected) => {
                log::info!("Bridge closed the stream");
                break;
            }
            Err(e) => return Err(e),
        };

        for message in messages {
            history.push(start.elapsed(), message.distance);
            println!(
                "{:>9.3}s  {}  {:.1} cm",
                start.elapsed().as_secs_f64(),
                message.source,
                message.distance
            );
        }
    }

    if let Some(last) = history.latest() {
        let (from, to) = history.window_bounds();
        let visible: Vec<f64> = history.visible().map(|s| s.distance).collect();
        let mean = visible.iter().sum::<f64>() / visible.len().max(1) as f64;
        log::info!(
            "{} samples kept, last {:.1} cm, mean {:.1} cm over {:.1}-{:.1}s",
            history.len(),
            last.distance,
            mean,
            from.as_secs_f64(),
            to.as_secs_f64()
        );
    }
    if client.discarded() > 0 {
        log::warn!("{} malformed units discarded", client.discarded());
    }
    Ok(())
}
