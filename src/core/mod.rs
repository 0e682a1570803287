//! Core abstractions shared by the reader, recorder and broadcaster.
//!
//! - [`types::Measurement`]: one validated sensor reading
//! - [`sink::MeasurementSink`]: trait to implement for new measurement consumers

pub mod sink;
pub mod types;
