//! Configuration for connections, the listener and logging.
//!
//! Every struct deserializes with defaults for missing fields, so a config
//! file only needs to name what it overrides:
//!
//! ```
//! use sessionwire::config::SessionwireConfig;
//!
//! let config = SessionwireConfig::from_json_str(r#"{ "listener": { "accept_count": 8 } }"#).unwrap();
//! assert_eq!(config.listener.accept_count, 8);
//! assert_eq!(config.connection.recv_buffer_capacity, 64 * 1024);
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SessionwireError};
use crate::protocol::{DEFAULT_BUFFER_CAPACITY, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::writer::DEFAULT_MAX_BATCH_SEGMENTS;

/// Default listener bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0:7000";

/// Default number of outstanding accept operations.
pub const DEFAULT_ACCEPT_COUNT: usize = 4;

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Receive buffer capacity in bytes.
    pub recv_buffer_capacity: usize,
    /// Largest payload a peer may announce.
    pub max_payload_size: u32,
    /// Maximum segments per vectored write call.
    pub max_batch_segments: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            recv_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_batch_segments: DEFAULT_MAX_BATCH_SEGMENTS,
        }
    }
}

impl ConnectionConfig {
    /// Check that a maximum-size frame fits the receive buffer.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_segments == 0 {
            return Err(SessionwireError::Config(
                "max_batch_segments must be at least 1".to_string(),
            ));
        }

        let largest_frame = HEADER_SIZE + self.max_payload_size as usize;
        if largest_frame > self.recv_buffer_capacity {
            return Err(SessionwireError::Config(format!(
                "max_payload_size {} does not fit recv_buffer_capacity {}",
                self.max_payload_size, self.recv_buffer_capacity
            )));
        }

        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenerSettings {
    /// Address to bind, e.g. `0.0.0.0:7000`.
    pub bind: String,
    /// Number of acceptors kept outstanding.
    pub accept_count: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            accept_count: DEFAULT_ACCEPT_COUNT,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Include worker thread names in each record.
    pub with_thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            with_thread_names: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionwireConfig {
    pub connection: ConnectionConfig,
    pub listener: ListenerSettings,
    pub log: LogConfig,
}

impl SessionwireConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()?;
        if self.listener.accept_count == 0 {
            return Err(SessionwireError::Config(
                "accept_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
