//! Consumer side of the measurement stream
//!
//! [`StreamClient`] connects to a bridge and yields parsed units;
//! [`DistanceHistory`] keeps the rolling sample buffer a live plot or
//! monitor draws from.

use crate::error::{Error, Result};
use crate::streaming::wire::{WireDecoder, WireMessage};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Samples kept by default
pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

/// Visible time span by default
pub const DEFAULT_TIME_WINDOW: Duration = Duration::from_secs(30);

const RECV_BUFFER_SIZE: usize = 1024;

/// Subscriber connection to a running bridge
pub struct StreamClient {
    stream: TcpStream,
    decoder: WireDecoder,
    buf: [u8; RECV_BUFFER_SIZE],
}

impl StreamClient {
    /// Connect to a bridge
    ///
    /// `read_timeout` bounds how long [`recv`](Self::recv) blocks when the
    /// stream is idle.
    pub fn connect<A: ToSocketAddrs>(addr: A, read_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(read_timeout))?;
        Ok(Self {
            stream,
            decoder: WireDecoder::new(),
            buf: [0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Wait for data and return every unit it completes
    ///
    /// Returns an empty vector when the read timed out or only part of a
    /// unit arrived, and [`Error::Disconnected`] once the bridge closes the
    /// stream.
    pub fn recv(&mut self) -> Result<Vec<WireMessage>> {
        match self.stream.read(&mut self.buf) {
            Ok(0) => Err(Error::Disconnected),
            Ok(n) => Ok(self.decoder.push(&self.buf[..n])),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Malformed units dropped so far
    pub fn discarded(&self) -> u64 {
        self.decoder.discarded()
    }
}

/// One received distance, stamped with time since the consumer started
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub elapsed: Duration,
    pub distance: f64,
}

/// Bounded rolling history of received distances
#[derive(Debug, Clone)]
pub struct DistanceHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
    time_window: Duration,
}

impl DistanceHistory {
    pub fn new(capacity: usize, time_window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            time_window,
        }
    }

    /// Append a sample, evicting the oldest once full
    pub fn push(&mut self, elapsed: Duration, distance: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(Sample { elapsed, distance });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Visible time range: `[0, window]` until the newest sample passes the
    /// window, then the last `window` seconds
    pub fn window_bounds(&self) -> (Duration, Duration) {
        match self.latest() {
            Some(last) if last.elapsed > self.time_window => {
                (last.elapsed - self.time_window, last.elapsed)
            }
            _ => (Duration::ZERO, self.time_window),
        }
    }

    /// Samples inside [`window_bounds`](Self::window_bounds)
    pub fn visible(&self) -> impl Iterator<Item = &Sample> {
        let (start, end) = self.window_bounds();
        self.samples
            .iter()
            .filter(move |s| s.elapsed >= start && s.elapsed <= end)
    }
}

impl Default for DistanceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_TIME_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_history_capacity() {
        let mut history = DistanceHistory::new(3, secs(30));
        for i in 0..5u64 {
            history.push(secs(i), i as f64);
        }

        assert_eq!(history.len(), 3);
        let distances: Vec<f64> = history.samples().map(|s| s.distance).collect();
        assert_eq!(distances, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_history_keeps_zero_distance() {
        let mut history = DistanceHistory::default();
        history.push(secs(1), 0.0);
        assert_eq!(history.latest().map(|s| s.distance), Some(0.0));
    }

    #[test]
    fn test_window_bounds_scroll() {
        let mut history = DistanceHistory::new(100, secs(30));
        assert_eq!(history.window_bounds(), (Duration::ZERO, secs(30)));

        history.push(secs(10), 1.0);
        assert_eq!(history.window_bounds(), (Duration::ZERO, secs(30)));

        history.push(secs(45), 2.0);
        assert_eq!(history.window_bounds(), (secs(15), secs(45)));
        let visible: Vec<f64> = history.visible().map(|s| s.distance).collect();
        assert_eq!(visible, vec![2.0]);
    }

    #[test]
    fn test_client_reassembles_units() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"lidar1:1").unwrap();
            stream.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
            stream.write_all(b"0.5#bad#lidar1:0.0#").unwrap();
        });

        let mut client = StreamClient::connect(addr, Duration::from_millis(200)).unwrap();
        let mut received = Vec::new();
        loop {
            match client.recv() {
                Ok(messages) => received.extend(messages),
                Err(Error::Disconnected) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        server.join().unwrap();

        let distances: Vec<f64> = received.iter().map(|m| m.distance).collect();
        assert_eq!(distances, vec![10.5, 0.0]);
        assert_eq!(client.discarded(), 1);
    }
}
