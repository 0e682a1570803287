//! TCP subscriber server
//!
//! Accepts connections for the lifetime of the process and registers each
//! one with the [`BroadcastRegistry`]. Subscribers never talk back: the
//! server does not read from them, and anything they send is ignored.
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──bind ok──► Listening ──stop / fatal accept error──► Stopped
//! ```
//!
//! Binding happens in [`SubscriberServer::bind`] so an unusable address is a
//! startup failure. Accept errors fall in four groups:
//!
//! | Group | Examples | Reaction |
//! |-------|----------|----------|
//! | connection | `ECONNABORTED`, `EPROTO` | log, accept the next one |
//! | exhausted | `EMFILE`, `ENFILE`, `ENOBUFS`, `ENOMEM` | log, back off, retry for as long as it takes |
//! | fatal | `EBADF`, `EINVAL`, `ENOTSOCK` | stop the server |
//! | unknown | anything else | stop after repeated consecutive failures |

use crate::error::{Error, Result};
use crate::streaming::registry::BroadcastRegistry;
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Poll interval of the nonblocking accept loop
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Back-off after an accept error
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Consecutive unknown accept errors before the listener is considered dead
const MAX_CONSECUTIVE_ACCEPT_ERRORS: u32 = 10;

/// How the accept loop reacts to a failed `accept`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// One pending connection failed; the listener is fine
    Connection,
    /// Out of descriptors, buffers or memory; clears once resources free up
    Exhausted,
    /// The listening socket itself is unusable
    Fatal,
    Unknown,
}

/// Service-wide server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Listening,
    Stopped,
}

/// Subscriber server owning the listening socket and its accept thread
pub struct SubscriberServer {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    registry: Arc<BroadcastRegistry>,
    write_timeout: Duration,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<ServerState>>,
    accept_handle: Option<JoinHandle<Result<()>>>,
}

impl SubscriberServer {
    /// Bind the listening socket
    ///
    /// # Arguments
    /// - `address`: TCP bind address (e.g., "0.0.0.0:12345")
    /// - `registry`: registry that accepted connections are added to
    /// - `write_timeout`: per-write timeout applied to every subscriber socket
    pub fn bind(
        address: &str,
        registry: Arc<BroadcastRegistry>,
        write_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address).map_err(|source| Error::Bind {
            address: address.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener: Some(listener),
            local_addr,
            registry,
            write_timeout,
            running: Arc::new(AtomicBool::new(true)),
            state: Arc::new(Mutex::new(ServerState::Starting)),
            accept_handle: None,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Spawn the accept thread
    pub fn start(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Other("subscriber server already started".to_string()))?;

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        let state = Arc::clone(&self.state);
        let write_timeout = self.write_timeout;

        *self.state.lock() = ServerState::Listening;
        let handle = thread::Builder::new()
            .name("subscriber-server".to_string())
            .spawn(move || {
                let result =
                    accept_loop(|| listener.accept(), &registry, &running, write_timeout);
                *state.lock() = ServerState::Stopped;
                if let Err(ref e) = result {
                    log::error!("Subscriber server stopped: {}", e);
                }
                result
            })
            .map_err(|e| {
                *self.state.lock() = ServerState::Stopped;
                Error::Other(format!("Failed to spawn subscriber server: {}", e))
            })?;
        self.accept_handle = Some(handle);

        log::info!(
            "Server is listening on {} (source '{}')",
            self.local_addr,
            self.registry.source_name()
        );
        Ok(())
    }

    /// Stop accepting and close the listening socket
    ///
    /// Already registered subscribers stay in the registry until its owner
    /// clears it. Returns the accept loop's fatal error, if it died from one.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::Relaxed);
        // Never started: drop the listener here
        self.listener = None;

        let result = match self.accept_handle.take() {
            Some(handle) => handle.join().map_err(|_| Error::ThreadPanic)?,
            None => Ok(()),
        };
        *self.state.lock() = ServerState::Stopped;
        result
    }
}

impl Drop for SubscriberServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn accept_loop<A>(
    mut accept: A,
    registry: &BroadcastRegistry,
    running: &AtomicBool,
    write_timeout: Duration,
) -> Result<()>
where
    A: FnMut() -> io::Result<(TcpStream, SocketAddr)>,
{
    let mut unknown_errors = 0u32;
    let mut exhausted_retries: Option<u32> = None;

    while running.load(Ordering::Relaxed) {
        let e = match accept() {
            Ok((stream, addr)) => {
                unknown_errors = 0;
                if let Some(retries) = exhausted_retries.take() {
                    log::info!("Accepting again after {} exhausted retries", retries);
                }
                match prepare_stream(&stream, write_timeout) {
                    Ok(()) => {
                        registry.register(addr.to_string(), stream);
                        log::info!("New client connected: {}", addr);
                    }
                    Err(e) => log::warn!("Dropping client {}: {}", addr, e),
                }
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => e,
        };

        match classify_accept_error(&e) {
            AcceptFailure::Connection => {
                log::warn!("Transient accept error: {}", e);
            }
            AcceptFailure::Exhausted => {
                if exhausted_retries.is_none() {
                    log::warn!("Cannot accept subscribers, retrying: {}", e);
                }
                exhausted_retries = Some(exhausted_retries.map_or(1, |n| n + 1));
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
            AcceptFailure::Fatal => return Err(Error::Listener(e)),
            AcceptFailure::Unknown => {
                unknown_errors += 1;
                log::error!(
                    "Accept error ({}/{}): {}",
                    unknown_errors,
                    MAX_CONSECUTIVE_ACCEPT_ERRORS,
                    e
                );
                if unknown_errors >= MAX_CONSECUTIVE_ACCEPT_ERRORS {
                    return Err(Error::Listener(e));
                }
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }

    log::info!("Subscriber server exiting");
    Ok(())
}

/// Blocking writes with a bounded timeout, no Nagle delay
fn prepare_stream(stream: &TcpStream, write_timeout: Duration) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_write_timeout(Some(write_timeout))?;
    stream.set_nodelay(true)?;
    Ok(())
}

fn classify_accept_error(e: &io::Error) -> AcceptFailure {
    if let Some(failure) = e.raw_os_error().and_then(classify_errno) {
        return failure;
    }
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::TimedOut => AcceptFailure::Connection,
        io::ErrorKind::OutOfMemory => AcceptFailure::Exhausted,
        _ => AcceptFailure::Unknown,
    }
}

#[cfg(unix)]
fn classify_errno(code: i32) -> Option<AcceptFailure> {
    match code {
        // Linux hands pending network errors of the new socket to accept()
        libc::ECONNABORTED
        | libc::EPROTO
        | libc::ENETDOWN
        | libc::ENOPROTOOPT
        | libc::EHOSTDOWN
        | libc::EHOSTUNREACH
        | libc::EOPNOTSUPP
        | libc::ENETUNREACH
        | libc::EPERM => Some(AcceptFailure::Connection),
        libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
            Some(AcceptFailure::Exhausted)
        }
        libc::EBADF | libc::EINVAL | libc::ENOTSOCK | libc::EFAULT => Some(AcceptFailure::Fatal),
        _ => None,
    }
}

#[cfg(not(unix))]
fn classify_errno(_code: i32) -> Option<AcceptFailure> {
    None
}
