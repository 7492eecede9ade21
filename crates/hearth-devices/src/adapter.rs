//! Protocol adapter interface.
//!
//! An adapter owns every single-device operation for one communication
//! protocol: sending commands, checking liveness and reading the current
//! property map. Adapters report failures through [`AdapterError`]; the
//! dispatch layer converts those into failure results so that one device's
//! fault never aborts a batch operation.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use hearth_core::Device;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error type for protocol adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Communication error with the device
    #[error("Communication error: {0}")]
    Communication(String),

    /// Operation timeout
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    /// Other error
    #[error("Adapter error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Single-device operations for one communication protocol.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Adapter name, used in log output.
    fn name(&self) -> &'static str;

    /// Send a command with its parameters to the device.
    ///
    /// Returns `Ok(false)` when the device rejected or dropped the command.
    /// A `false` return does not imply the state is unchanged; the command
    /// may have been partially applied.
    async fn send_command(
        &self,
        device: &Device,
        command: &str,
        parameters: &HashMap<String, String>,
    ) -> AdapterResult<bool>;

    /// Check whether the device is currently reachable.
    async fn check_liveness(&self, device: &Device) -> AdapterResult<bool>;

    /// Read the device's current property map.
    async fn fetch_properties(&self, device: &Device) -> AdapterResult<HashMap<String, String>>;
}
