//! TFmini-style ranging lidar serial protocol
//!
//! The sensor streams fixed 9-byte frames with no separator between them:
//!
//! ```text
//! ┌──────┬──────┬────────┬────────┬────────┬────────┬────────┬────────┬──────────┐
//! │ 0x59 │ 0x59 │ dist_L │ dist_H │ str_L  │ str_H  │ temp_L │ temp_H │ checksum │
//! └──────┴──────┴────────┴────────┴────────┴────────┴────────┴────────┴──────────┘
//! ```
//!
//! `checksum` is the low byte of the sum of the first eight bytes. Because the
//! stream has no framing, the decoder re-tests alignment at every byte.

use super::window::FrameWindow;
use crate::core::types::Measurement;
use chrono::{DateTime, Local};

/// Frame header byte, repeated twice at the start of every frame
pub const FRAME_HEADER: u8 = 0x59;

/// Total frame length including header and checksum
pub const FRAME_LEN: usize = 9;

/// Command selecting continuous output mode, sent once before reading
pub const INIT_COMMAND: [u8; 5] = [0x5A, 0x05, 0x07, 0x00, 0x66];

/// Low byte of the sum of `bytes`
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build a well-formed frame, e.g. for replay files and tests
pub fn encode_frame(distance: u16, strength: u16, temperature: u16) -> [u8; FRAME_LEN] {
    let [dl, dh] = distance.to_le_bytes();
    let [sl, sh] = strength.to_le_bytes();
    let [tl, th] = temperature.to_le_bytes();
    let mut frame = [FRAME_HEADER, FRAME_HEADER, dl, dh, sl, sh, tl, th, 0];
    frame[8] = checksum(&frame[..8]);
    frame
}

/// Decoder counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Bytes fed since creation
    pub bytes: u64,
    /// Frames that passed the checksum
    pub frames: u64,
    /// Header matches rejected by the checksum
    pub checksum_errors: u64,
}

/// Byte-at-a-time frame synchronizer
///
/// Never fails: anything that is not a checksum-valid frame is stream noise.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    window: FrameWindow<FRAME_LEN>,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte, stamping any completed measurement with the current time
    #[inline]
    pub fn feed(&mut self, byte: u8) -> Option<Measurement> {
        self.feed_with(byte, Local::now)
    }

    /// Feed one byte with an explicit observation time
    pub fn feed_at(&mut self, byte: u8, observed_at: DateTime<Local>) -> Option<Measurement> {
        self.feed_with(byte, || observed_at)
    }

    /// Feed a chunk, collecting every measurement it completes in order
    pub fn feed_slice(&mut self, bytes: &[u8]) -> Vec<Measurement> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }

    /// Drop buffered bytes; the next frame needs a full window again
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn feed_with<F>(&mut self, byte: u8, clock: F) -> Option<Measurement>
    where
        F: FnOnce() -> DateTime<Local>,
    {
        self.window.push(byte);
        self.stats.bytes += 1;

        let frame = self.window.snapshot()?;
        if frame[0] != FRAME_HEADER || frame[1] != FRAME_HEADER {
            return None;
        }

        let expected = checksum(&frame[..8]);
        if expected != frame[8] {
            self.stats.checksum_errors += 1;
            log::trace!(
                "Checksum mismatch: expected {:#04x}, got {:#04x}",
                expected,
                frame[8]
            );
            return None;
        }

        self.stats.frames += 1;
        Some(Measurement::observed(
            u16::from_le_bytes([frame[2], frame[3]]),
            u16::from_le_bytes([frame[4], frame[5]]),
            u16::from_le_bytes([frame[6], frame[7]]),
            clock(),
        ))
    }
}
