//! Transport layer for I/O abstraction

use crate::error::Result;

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Byte link to a sensor
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read
    ///
    /// `Ok(0)` means nothing arrived within the link's read timeout. Any
    /// `Err` is treated as a lost link by the reader.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write some of `data`, returns number of bytes accepted
    ///
    /// May accept fewer bytes than given; callers resume from there.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;
}
