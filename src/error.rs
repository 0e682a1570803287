//! Error types for lidar-bridge

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// lidar-bridge error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error (open/configure)
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed, written or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sensor initialization command could not be delivered
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// Subscriber listener could not be bound
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Requested bind address
        address: String,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// Listening socket failed while accepting
    #[error("Listener failed: {0}")]
    Listener(std::io::Error),

    /// Serial link failed while reading
    #[error("Sensor link lost: {0}")]
    LinkLost(String),

    /// Peer closed the stream
    #[error("Stream disconnected")]
    Disconnected,

    /// Worker thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
