//! Remote platform interface consumed by the reconciliation engine.
//!
//! [`ThingsBoardClient`](crate::client::ThingsBoardClient) is the production
//! implementation; tests substitute their own. The scope-correct routing is
//! part of the contract: CLIENT-scope traffic rides the device credential,
//! SHARED/SERVER traffic rides the platform session.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use hearth_core::{AttributeScope, Device};

use crate::error::SyncError;
use crate::telemetry::TelemetryValue;

/// CLIENT and SHARED attributes as returned by the public, credential-keyed
/// attribute endpoint.
#[derive(Debug, Clone, Default)]
pub struct ScopedAttributes {
    pub client: HashMap<String, Value>,
    pub shared: HashMap<String, Value>,
}

/// A device record as listed by the remote platform.
#[derive(Debug, Clone)]
pub struct RemoteDeviceInfo {
    /// Remote identity (the inner uuid of the nested id object)
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub label: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
}

/// Operations the reconciliation engine needs from the remote platform.
#[async_trait]
pub trait RemotePlatform: Send + Sync {
    /// CLIENT and SHARED attributes via the public endpoint (device
    /// credential, no session).
    async fn fetch_attributes(&self, token: &str) -> Result<ScopedAttributes, SyncError>;

    /// SERVER-scope attributes via the session-keyed endpoint.
    async fn fetch_server_attributes(
        &self,
        device_id: &str,
    ) -> Result<HashMap<String, Value>, SyncError>;

    /// Map a device credential to the remote identity. Implementations may
    /// fall back to a linear scan over all remote devices; the caller caches
    /// the result on the device record.
    async fn resolve_device_id(&self, token: &str) -> Result<String, SyncError>;

    /// Latest time-series values for every telemetry key of a device.
    async fn fetch_latest_telemetry(
        &self,
        device_id: &str,
    ) -> Result<HashMap<String, TelemetryValue>, SyncError>;

    /// Latest value for one specific telemetry key, if present.
    async fn fetch_telemetry_key(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<TelemetryValue>, SyncError>;

    /// Push attribute values into one scope, using the scope-correct route.
    async fn push_attributes(
        &self,
        device: &Device,
        scope: AttributeScope,
        values: HashMap<String, String>,
    ) -> Result<(), SyncError>;

    /// Push telemetry values through the device credential; the current
    /// device status is always included.
    async fn push_telemetry(
        &self,
        device: &Device,
        values: HashMap<String, String>,
    ) -> Result<(), SyncError>;

    /// List all devices known to the remote platform.
    async fn list_devices(&self) -> Result<Vec<RemoteDeviceInfo>, SyncError>;

    /// Access credential of a remote device.
    async fn device_credentials(&self, device_id: &str) -> Result<String, SyncError>;
}
