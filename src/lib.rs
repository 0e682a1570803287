//! lidar-bridge - serial ranging lidar to TCP subscribers
//!
//! Decodes the fixed 9-byte frames of a TFmini-style ranging lidar, logs every
//! validated measurement to CSV, and fans a compact text stream out to any
//! number of TCP subscribers.
//!
//! ```text
//! serial bytes ─► FrameDecoder ─► Measurement ─┬─► CsvRecorder
//!                                              └─► BroadcastRegistry ─► subscribers
//! ```

pub mod app;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod recording;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::core::types::Measurement;
pub use crate::error::{Error, Result};
