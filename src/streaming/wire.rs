//! Wire format for the measurement stream
//!
//! # Protocol
//!
//! One UTF-8 text unit per measurement, terminated by a literal `#`:
//!
//! ```text
//! <source_name>:<distance with one decimal>#
//! lidar1:123.4#
//! ```
//!
//! There is no newline and no length prefix. TCP may split or merge units
//! arbitrarily, so consumers accumulate bytes and cut on `#`.
//!
//! ## Consumer rules
//!
//! - Strip the trailing `#`, split on `:`, parse the second field as `f64`
//! - Fields after the second are ignored (`lidar1:12.5:x#` reads as 12.5)
//! - Units without `:` or with a non-numeric value are dropped silently
//! - `0.0` is a valid distance

use crate::core::types::Measurement;

/// Unit terminator
pub const MESSAGE_TERMINATOR: u8 = b'#';

/// Separator between source name and value
pub const FIELD_SEPARATOR: char = ':';

/// Partial units longer than this are discarded as garbage
const MAX_PENDING_BYTES: usize = 4096;

/// Encode a measurement for the given source, e.g. `lidar1:42.0#`
pub fn encode_measurement(source: &str, measurement: &Measurement) -> String {
    format!("{}:{:.1}#", source, f64::from(measurement.distance))
}

/// One parsed wire unit
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub source: String,
    pub distance: f64,
}

/// Parse one unit, with or without its trailing `#`
///
/// Returns `None` for malformed units.
pub fn parse_message(unit: &str) -> Option<WireMessage> {
    let unit = unit.strip_suffix(MESSAGE_TERMINATOR as char).unwrap_or(unit);
    let mut fields = unit.split(FIELD_SEPARATOR);
    let source = fields.next()?;
    let value = fields.next()?;
    let distance = value.trim().parse::<f64>().ok()?;
    if !distance.is_finite() {
        return None;
    }
    Some(WireMessage {
        source: source.to_string(),
        distance,
    })
}

/// Incremental decoder for the consumer side of the stream
#[derive(Debug, Default)]
pub struct WireDecoder {
    pending: Vec<u8>,
    discarded: u64,
}

impl WireDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes, returning every unit they complete in order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<WireMessage> {
        let mut messages = Vec::new();

        for &byte in bytes {
            if byte != MESSAGE_TERMINATOR {
                self.pending.push(byte);
                continue;
            }

            let parsed = std::str::from_utf8(&self.pending)
                .ok()
                .and_then(parse_message);
            match parsed {
                Some(message) => messages.push(message),
                None => self.discarded += 1,
            }
            self.pending.clear();
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            log::debug!(
                "Dropping {} bytes without a terminator",
                self.pending.len()
            );
            self.pending.clear();
            self.discarded += 1;
        }

        messages
    }

    /// Bytes waiting for their terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Malformed units dropped so far
    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_measurement() {
        let m = Measurement::new(42, 100, 2000);
        assert_eq!(encode_measurement("lidar1", &m), "lidar1:42.0#");

        let m = Measurement::new(0, 0, 0);
        assert_eq!(encode_measurement("front", &m), "front:0.0#");
    }

    #[test]
    fn test_parse_message() {
        assert_eq!(
            parse_message("lidar1:123.4#"),
            Some(WireMessage {
                source: "lidar1".to_string(),
                distance: 123.4
            })
        );
        assert_eq!(parse_message("lidar1:7").map(|m| m.distance), Some(7.0));
        assert_eq!(parse_message("lidar1:0.0#").map(|m| m.distance), Some(0.0));
        assert_eq!(parse_message("lidar1"), None);
        assert_eq!(parse_message("lidar1:abc#"), None);
        assert_eq!(parse_message("lidar1:#"), None);
        assert_eq!(parse_message("lidar1:NaN#"), None);
    }

    #[test]
    fn test_parse_message_ignores_trailing_fields() {
        assert_eq!(
            parse_message("a:1.0:x#"),
            Some(WireMessage {
                source: "a".to_string(),
                distance: 1.0
            })
        );
        assert_eq!(parse_message("a::1.0#"), None);

        let mut decoder = WireDecoder::new();
        let out = decoder.push(b"lidar1:12.5:extra#");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].distance, 12.5);
        assert_eq!(decoder.discarded(), 0);
    }

    #[test]
    fn test_decoder_handles_split_and_merged_units() {
        let mut decoder = WireDecoder::new();

        let out = decoder.push(b"lidar1:12.0#lidar1:1");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].distance, 12.0);
        assert_eq!(decoder.pending_len(), 8);

        let out = decoder.push(b"3.5#lidar1:0.0#");
        let distances: Vec<f64> = out.iter().map(|m| m.distance).collect();
        assert_eq!(distances, vec![13.5, 0.0]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_decoder_discards_malformed_units() {
        let mut decoder = WireDecoder::new();
        let out = decoder.push(b"garbage#lidar1:x#lidar1:5.0#\xff\xfe:1.0#");

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].distance, 5.0);
        assert_eq!(decoder.discarded(), 3);
    }

    #[test]
    fn test_decoder_bounds_pending_bytes() {
        let mut decoder = WireDecoder::new();
        let junk = vec![b'a'; MAX_PENDING_BYTES + 1];
        assert!(decoder.push(&junk).is_empty());
        assert_eq!(decoder.pending_len(), 0);

        let out = decoder.push(b"lidar1:1.0#");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_encoded_measurement_round_trips() {
        let m = Measurement::new(1234, 1, 1);
        let mut decoder = WireDecoder::new();
        let out = decoder.push(encode_measurement("rear", &m).as_bytes());
        assert_eq!(
            out,
            vec![WireMessage {
                source: "rear".to_string(),
                distance: 1234.0
            }]
        );
    }
}
