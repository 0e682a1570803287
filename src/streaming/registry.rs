//! Broadcast registry for live measurement subscribers
//!
//! One producer (the sensor reader) fans every measurement out to all
//! registered connections. The subscriber server only inserts; the registry
//! removes a subscriber on its first failed write.
//!
//! # Locking
//!
//! The subscriber list sits behind a single mutex that is held only to
//! register, remove or take a snapshot. Writes happen on the snapshot with the
//! list unlocked, so a `register` racing a publish is never blocked by slow
//! sockets; the new subscriber simply starts with the next measurement.
//! Each connection has its own lock, so bytes of two units never interleave
//! on one socket.
//!
//! # Slow subscribers
//!
//! Connections are expected to carry a bounded write timeout (the subscriber
//! server sets one on every accepted socket). A write that times out counts
//! as a failure and the subscriber is dropped, which keeps the reader thread
//! from stalling behind one client.

use crate::core::sink::MeasurementSink;
use crate::core::types::Measurement;
use crate::error::Result;
use crate::streaming::wire::encode_measurement;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque subscriber identifier, unique per registry
pub type SubscriberId = u64;

/// Write half of a subscriber connection
pub type Connection = Box<dyn Write + Send>;

/// One registered subscriber
struct Subscriber {
    id: SubscriberId,
    peer: String,
    conn: Mutex<Connection>,
}

impl Subscriber {
    fn send(&self, payload: &[u8]) -> std::io::Result<()> {
        let mut conn = self.conn.lock();
        conn.write_all(payload)?;
        conn.flush()
    }
}

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Subscribers registered since creation
    pub registered: u64,
    /// Subscribers dropped after a failed write
    pub pruned: u64,
    /// Payloads fanned out
    pub published: u64,
}

/// Thread-safe set of live subscribers
pub struct BroadcastRegistry {
    source_name: String,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
    pruned: AtomicU64,
    published: AtomicU64,
}

impl BroadcastRegistry {
    /// Create an empty registry publishing under `source_name`
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            pruned: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Add a connection; `peer` is only used for logging
    pub fn register<W>(&self, peer: impl Into<String>, conn: W) -> SubscriberId
    where
        W: Write + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            peer: peer.into(),
            conn: Mutex::new(Box::new(conn)),
        });

        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.push(subscriber);
            subscribers.len()
        };
        log::debug!("Subscriber #{} registered ({} live)", id, count);
        id
    }

    /// Explicitly disconnect a subscriber, returns false if it was not present
    pub fn remove(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }

    /// Drop every subscriber, returns how many were removed
    pub fn clear(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        let count = subscribers.len();
        subscribers.clear();
        count
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            registered: self.next_id.load(Ordering::Relaxed) - 1,
            pruned: self.pruned.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }

    /// Encode a measurement and send it to every subscriber
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, measurement: &Measurement) -> usize {
        let message = encode_measurement(&self.source_name, measurement);
        self.broadcast(message.as_bytes())
    }

    /// Send raw bytes to every subscriber, pruning those whose write fails
    ///
    /// Returns the number of subscribers that received the payload. Failed
    /// subscribers are gone from the registry when this returns.
    pub fn broadcast(&self, payload: &[u8]) -> usize {
        let snapshot: Vec<Arc<Subscriber>> = self.subscribers.lock().clone();
        if snapshot.is_empty() {
            return 0;
        }

        let mut failed: Vec<SubscriberId> = Vec::new();
        for subscriber in &snapshot {
            if let Err(e) = subscriber.send(payload) {
                log::warn!(
                    "Subscriber #{} ({}) disconnected: {}",
                    subscriber.id,
                    subscriber.peer,
                    e
                );
                failed.push(subscriber.id);
            }
        }

        if !failed.is_empty() {
            self.subscribers
                .lock()
                .retain(|s| !failed.contains(&s.id));
            self.pruned
                .fetch_add(failed.len() as u64, Ordering::Relaxed);
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        snapshot.len() - failed.len()
    }
}

impl MeasurementSink for Arc<BroadcastRegistry> {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn accept(&mut self, measurement: &Measurement) -> Result<()> {
        let delivered = self.publish(measurement);
        log::trace!("Measurement delivered to {} subscribers", delivered);
        Ok(())
    }
}
