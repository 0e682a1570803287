//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// In-memory transport for tests and offline replay
///
/// Clones share the same buffers, so a test can keep one handle to inject
/// bytes while the reader thread owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    /// Fail reads once the read buffer is drained
    fail_reads_when_empty: bool,
    /// Writes that succeed before `failing_writes` kick in
    writes_before_failure: u32,
    /// Number of upcoming writes that fail
    failing_writes: u32,
    /// Most bytes a single write accepts
    write_chunk: Option<usize>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Bytes still waiting to be read
    pub fn pending_read(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }

    /// Simulate the device disappearing once queued bytes are consumed
    pub fn disconnect_after_drain(&self) {
        self.inner.lock().fail_reads_when_empty = true;
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: u32) {
        self.fail_writes_after(0, count);
    }

    /// Let `successes` writes through, then fail the next `count`
    pub fn fail_writes_after(&self, successes: u32, count: u32) {
        let mut inner = self.inner.lock();
        inner.writes_before_failure = successes;
        inner.failing_writes = count;
    }

    /// Accept at most `max` bytes per write, like a full output buffer
    pub fn limit_write_chunk(&self, max: usize) {
        self.inner.lock().write_chunk = Some(max.max(1));
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.read_buffer.is_empty() {
            if inner.fail_reads_when_empty {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "mock device removed",
                )));
            }
            drop(inner);
            // Stand in for the serial read timeout
            thread::sleep(Duration::from_millis(1));
            return Ok(0);
        }

        let available = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer
            .iter_mut()
            .zip(inner.read_buffer.drain(..available))
        {
            *slot = byte;
        }

        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.writes_before_failure > 0 {
            inner.writes_before_failure -= 1;
        } else if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "mock write failure",
            )));
        }

        let accepted = inner.write_chunk.map_or(data.len(), |max| max.min(data.len()));
        inner.write_buffer.extend_from_slice(&data[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_drains_injected_bytes() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.inject_read(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 3];
        assert_eq!(transport.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(handle.pending_read(), 2);
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(transport.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_disconnect_after_drain() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.inject_read(&[9]);
        handle.disconnect_after_drain();

        let mut buf = [0u8; 4];
        assert_eq!(transport.read(&mut buf).unwrap(), 1);
        assert!(transport.read(&mut buf).is_err());
    }

    #[test]
    fn test_failing_writes() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.fail_next_writes(1);

        assert!(transport.write(&[1, 2]).is_err());
        assert_eq!(transport.write(&[3, 4]).unwrap(), 2);
        assert_eq!(handle.get_written(), vec![3, 4]);
    }

    #[test]
    fn test_partial_writes() {
        let handle = MockTransport::new();
        let mut transport = handle.clone();
        handle.limit_write_chunk(2);
        handle.fail_writes_after(1, 1);

        assert_eq!(transport.write(&[1, 2, 3]).unwrap(), 2);
        assert!(transport.write(&[3]).is_err());
        assert_eq!(transport.write(&[3]).unwrap(), 1);
        assert_eq!(handle.get_written(), vec![1, 2, 3]);
    }
}
