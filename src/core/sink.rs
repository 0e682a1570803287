//! MeasurementSink trait definition

use crate::core::types::Measurement;
use crate::error::Result;

/// Consumer of validated measurements, driven from the sensor reader thread
///
/// Implementations run inline with byte decoding, so they must return
/// promptly. An error is logged by the reader and never stops it.
pub trait MeasurementSink: Send {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Handle one measurement
    fn accept(&mut self, measurement: &Measurement) -> Result<()>;
}
