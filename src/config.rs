//! Configuration for radar-relay
//!
//! Loads configuration from a TOML file. Every section is optional; missing
//! fields fall back to the loopback defaults used by the deployed radar
//! relay (target stream on port 8899).

use crate::error::Result;
use crate::protocol::{Preamble, ProtocolVariant, RecordLayout};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub protocol: ProtocolConfig,
    pub relay: RelayConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Wire protocol selection (both ends must agree)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Frame preamble (`plain` or `indexed`)
    pub preamble: Preamble,

    /// Record struct layout (`kinematic` or `full`)
    pub layout: RecordLayout,

    /// Largest accepted body length in bytes
    ///
    /// Defaults to the largest valid body for the record layout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_body_len: Option<usize>,
}

impl ProtocolConfig {
    pub fn variant(&self) -> ProtocolVariant {
        ProtocolVariant::new(self.preamble, self.layout)
    }

    /// Effective body length limit
    pub fn max_body_len(&self) -> usize {
        self.max_body_len
            .unwrap_or_else(|| self.variant().max_body_len())
    }
}

/// Sender-side configuration (serial input, TCP output)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Frame server address
    ///
    /// Examples:
    /// - `127.0.0.1:8899` - Local frame server
    /// - `192.168.1.20:7788` - Alternate deployment
    pub server_address: String,

    /// Connection attempts per connect cycle
    pub max_retries: u32,

    /// Delay between connection attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Per-attempt connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Radar serial port (e.g. `/dev/ttyUSB0`, `COM30`)
    pub serial_port: String,

    /// Radar serial baud rate
    pub baud_rate: u32,

    /// Serial read timeout (milliseconds)
    pub serial_timeout_ms: u64,

    /// Meters per raw position unit in the sensor output
    pub position_scale: f32,

    /// Meters/second per raw velocity unit in the sensor output
    pub velocity_scale: f32,
}

impl RelayConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1:8899".to_string(),
            max_retries: 3,
            retry_delay_ms: 2000,
            connect_timeout_ms: 2000,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 921_600,
            serial_timeout_ms: 2000,
            position_scale: 0.01,
            velocity_scale: 0.01,
        }
    }
}

/// Receiver-side configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address
    pub bind_address: String,

    /// Stop after the first connection closes
    pub single_shot: bool,

    /// Socket read buffer size in bytes
    pub read_buffer_size: usize,

    /// Socket read timeout so the shutdown flag is checked (milliseconds)
    pub read_timeout_ms: u64,

    /// Consumer queue capacity in frames (0 = unbounded)
    pub queue_capacity: usize,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8899".to_string(),
            single_shot: false,
            read_buffer_size: 4096,
            read_timeout_ms: 500,
            queue_capacity: 256,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error); `RUST_LOG` wins
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use radar_relay::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("radar-relay.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
