//! Core data types for sensor readings.
//!
//! - [`Measurement`]: one checksum-validated frame from the ranging sensor
//! - [`LatestMeasurement`]: shared snapshot of the most recent reading

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::sync::Arc;

/// One validated reading from the ranging sensor
///
/// Produced only by the frame decoder after the checksum matches. Units are
/// the sensor's native ones: distance in cm, strength as a raw signal
/// amplitude, temperature as the raw chip value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub distance: u16,
    pub strength: u16,
    pub temperature: u16,
    pub observed_at: DateTime<Local>,
}

impl Measurement {
    pub fn new(distance: u16, strength: u16, temperature: u16) -> Self {
        Self::observed(distance, strength, temperature, Local::now())
    }

    pub fn observed(
        distance: u16,
        strength: u16,
        temperature: u16,
        observed_at: DateTime<Local>,
    ) -> Self {
        Self {
            distance,
            strength,
            temperature,
            observed_at,
        }
    }

    /// Seconds since the Unix epoch, with sub-second precision
    pub fn unix_timestamp(&self) -> f64 {
        self.observed_at.timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Cloneable handle to the most recent measurement
///
/// Written by the sensor reader, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct LatestMeasurement {
    inner: Arc<RwLock<Option<Measurement>>>,
}

impl LatestMeasurement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored measurement
    #[inline]
    pub fn set(&self, measurement: Measurement) {
        *self.inner.write() = Some(measurement);
    }

    /// Most recent measurement, if any frame has been decoded yet
    #[inline]
    pub fn get(&self) -> Option<Measurement> {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unix_timestamp() {
        let at = Local.timestamp_micros(1_700_000_000_250_000).unwrap();
        let m = Measurement::observed(120, 3000, 2400, at);
        assert!((m.unix_timestamp() - 1_700_000_000.25).abs() < 1e-6);
    }

    #[test]
    fn test_latest_measurement_shared() {
        let latest = LatestMeasurement::new();
        assert!(latest.get().is_none());

        let writer = latest.clone();
        let m = Measurement::new(42, 7, 1);
        writer.set(m);
        assert_eq!(latest.get(), Some(m));
    }
}
