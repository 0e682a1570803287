//! CSV measurement log
//!
//! Appends one line per accepted measurement:
//!
//! ```text
//! time,unix_timestamp,distance,strength,temp
//! 2024-05-01 12:30:15.000250,1714566615.000250,123,2048,2400
//! ```
//!
//! The header is written once, when the file is created (or found empty).
//! Every line is flushed so a crash loses at most the line being written.

use crate::core::sink::MeasurementSink;
use crate::core::types::Measurement;
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Column names, in file order
pub const CSV_HEADER: &str = "time,unix_timestamp,distance,strength,temp";

/// Human-readable timestamp format (local time, microseconds)
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render one measurement as a CSV line, without the newline
pub fn format_line(measurement: &Measurement) -> String {
    format!(
        "{},{:.6},{},{},{}",
        measurement.observed_at.format(TIME_FORMAT),
        measurement.unix_timestamp(),
        measurement.distance,
        measurement.strength,
        measurement.temperature
    )
}

/// Append-only CSV writer for measurements
pub struct CsvRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    line_count: u64,
}

impl CsvRecorder {
    /// Open `path` for appending, creating it with a header if needed
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{}", CSV_HEADER)?;
            writer.flush()?;
        }

        log::info!(
            "Recording measurements to {} ({})",
            path.display(),
            if is_new { "new file" } else { "appending" }
        );

        Ok(Self {
            writer,
            path,
            line_count: 0,
        })
    }

    /// Append one measurement
    pub fn record(&mut self, measurement: &Measurement) -> Result<()> {
        writeln!(self.writer, "{}", format_line(measurement))?;
        self.writer.flush()?;
        self.line_count += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written by this recorder (header excluded)
    pub fn line_count(&self) -> u64 {
        self.line_count
    }
}

impl MeasurementSink for CsvRecorder {
    fn name(&self) -> &str {
        "csv-recorder"
    }

    fn accept(&mut self, measurement: &Measurement) -> Result<()> {
        self.record(measurement)
    }
}
