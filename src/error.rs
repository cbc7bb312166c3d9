//! Error types for radar-relay

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// radar-relay error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// Frame cannot be encoded (too many records)
    #[error("Cannot encode {count} records in one frame (max {max})")]
    Encoding {
        /// Number of records supplied
        count: usize,
        /// Maximum records per frame
        max: usize,
    },

    /// Frame body carried no target-count byte
    #[error("Frame body is empty")]
    EmptyBody,

    /// Frame body shorter than its declared record count
    #[error("Truncated record data: expected {expected} bytes, got {actual}")]
    TruncatedRecord {
        /// Bytes required by the target count
        expected: usize,
        /// Bytes present after the target count
        actual: usize,
    },

    /// Declared body length exceeds the configured maximum
    #[error("Frame too large: body length {len} exceeds maximum {max}")]
    FrameTooLarge {
        /// Declared body length
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// Connection could not be established after exhausting retries
    #[error("Failed to connect to {address} after {attempts} attempts")]
    ConnectFailed {
        /// Peer address
        address: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Frame could not be sent even after a reconnect
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Listening socket could not be bound
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Requested bind address
        address: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
