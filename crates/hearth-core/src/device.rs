//! Device aggregate and the property-key namespace conventions.
//!
//! A device's `properties` map carries four reserved key namespaces that the
//! synchronization engine relies on:
//!
//! | Prefix         | Meaning                                  |
//! |----------------|------------------------------------------|
//! | `attr_client_` | mirror of a remote CLIENT-scope attribute |
//! | `attr_shared_` | mirror of a remote SHARED-scope attribute |
//! | `attr_server_` | mirror of a remote SERVER-scope attribute |
//! | `tb_`          | mirror of a remote telemetry key          |
//!
//! Keys without a reserved prefix are device-local and never synchronized to
//! a particular remote scope. Each reconciliation pass touches only the
//! namespace it is authoritative for.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Property-key prefix mirroring a remote CLIENT-scope attribute.
pub const ATTR_CLIENT_PREFIX: &str = "attr_client_";
/// Property-key prefix mirroring a remote SHARED-scope attribute.
pub const ATTR_SHARED_PREFIX: &str = "attr_shared_";
/// Property-key prefix mirroring a remote SERVER-scope attribute.
pub const ATTR_SERVER_PREFIX: &str = "attr_server_";
/// Property-key prefix mirroring a remote telemetry (time-series) key.
pub const TELEMETRY_PREFIX: &str = "tb_";

/// Returns true if the key belongs to one of the reserved sync namespaces.
pub fn is_namespaced_key(key: &str) -> bool {
    key.starts_with(ATTR_CLIENT_PREFIX)
        || key.starts_with(ATTR_SHARED_PREFIX)
        || key.starts_with(ATTR_SERVER_PREFIX)
        || key.starts_with(TELEMETRY_PREFIX)
}

/// Remote attribute scope.
///
/// CLIENT attributes are pushed through the public, credential-keyed
/// endpoint; SHARED and SERVER attributes go through the session-keyed
/// endpoint. The split is a remote-platform constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeScope {
    Client,
    Shared,
    Server,
}

impl AttributeScope {
    /// Local property-key prefix for this scope.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Client => ATTR_CLIENT_PREFIX,
            Self::Shared => ATTR_SHARED_PREFIX,
            Self::Server => ATTR_SERVER_PREFIX,
        }
    }

    /// Namespaced local key for a remote attribute name.
    pub fn local_key(&self, attribute: &str) -> String {
        format!("{}{}", self.prefix(), attribute)
    }
}

impl std::fmt::Display for AttributeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Shared => write!(f, "shared"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Communication protocol a device is reached through.
///
/// Selects which protocol adapter handles the device; exactly one adapter is
/// responsible for a device at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionProtocol {
    Wifi,
    Zigbee,
    Bluetooth,
    Mqtt,
    ZWave,
    Ir,
    Thread,
    Lora,
    Http,
    /// Virtual (emulated) devices handled by the simulator
    Virtual,
}

impl std::fmt::Display for ConnectionProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wifi => write!(f, "WIFI"),
            Self::Zigbee => write!(f, "ZIGBEE"),
            Self::Bluetooth => write!(f, "BLUETOOTH"),
            Self::Mqtt => write!(f, "MQTT"),
            Self::ZWave => write!(f, "Z_WAVE"),
            Self::Ir => write!(f, "IR"),
            Self::Thread => write!(f, "THREAD"),
            Self::Lora => write!(f, "LORA"),
            Self::Http => write!(f, "HTTP"),
            Self::Virtual => write!(f, "VIRTUAL"),
        }
    }
}

/// Reachability status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "ONLINE"),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// A smart-home device record.
///
/// Created and destroyed by the surrounding CRUD layer; the synchronization
/// engine mutates `properties`, `status`, `last_seen` and
/// `thingsboard_device_id` in place and persists through
/// [`DeviceStore::save`](crate::store::DeviceStore::save).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub name: String,
    /// Device kind (light, thermostat, sensor, switch, ...)
    pub device_type: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub protocol: ConnectionProtocol,
    pub status: DeviceStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    /// Dynamic device state, including the reserved sync namespaces.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Advisory description of supported operations; never validated against
    /// `properties`.
    #[serde(default)]
    pub capabilities: HashMap<String, String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    /// Remote access credential; a device without one is adapter-local only.
    #[serde(default)]
    pub thingsboard_token: Option<String>,
    /// Remote identity, resolved lazily and cached.
    #[serde(default)]
    pub thingsboard_device_id: Option<String>,
}

impl Device {
    /// Create a new offline device with a fresh id.
    pub fn new(name: impl Into<String>, device_type: impl Into<String>, protocol: ConnectionProtocol) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            device_type: device_type.into(),
            category: None,
            sub_type: None,
            protocol,
            status: DeviceStatus::Offline,
            last_seen: None,
            properties: HashMap::new(),
            capabilities: HashMap::new(),
            manufacturer: None,
            model: None,
            firmware_version: None,
            thingsboard_token: None,
            thingsboard_device_id: None,
        }
    }

    /// Set the remote access credential.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.thingsboard_token = Some(token.into());
        self
    }

    /// Set a device-local property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Whether the device is eligible for remote synchronization.
    pub fn has_remote_credential(&self) -> bool {
        self.thingsboard_token
            .as_deref()
            .is_some_and(|t| !t.is_empty())
    }

    /// Record that the device was confirmed reachable just now.
    pub fn touch(&mut self) {
        self.last_seen = Some(Utc::now());
    }

    /// Telemetry payload keys: everything outside the attribute namespaces,
    /// with the `tb_` prefix stripped for the wire.
    pub fn telemetry_values(&self) -> HashMap<String, String> {
        let mut values = HashMap::new();
        for (key, value) in &self.properties {
            if key.starts_with(ATTR_CLIENT_PREFIX)
                || key.starts_with(ATTR_SHARED_PREFIX)
                || key.starts_with(ATTR_SERVER_PREFIX)
            {
                continue;
            }
            let wire_key = key.strip_prefix(TELEMETRY_PREFIX).unwrap_or(key);
            values.insert(wire_key.to_string(), value.clone());
        }
        values
    }

    /// Attributes of one scope, keyed by their remote (prefix-free) names.
    pub fn scoped_attributes(&self, scope: AttributeScope) -> HashMap<String, String> {
        let prefix = scope.prefix();
        self.properties
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaced_key_detection() {
        assert!(is_namespaced_key("attr_client_mode"));
        assert!(is_namespaced_key("attr_shared_mode"));
        assert!(is_namespaced_key("attr_server_mode"));
        assert!(is_namespaced_key("tb_temperature"));
        assert!(!is_namespaced_key("power"));
    }

    #[test]
    fn telemetry_values_strip_prefix_and_skip_attributes() {
        let device = Device::new("lamp", "light", ConnectionProtocol::Virtual)
            .with_property("tb_temperature", "21.5")
            .with_property("power", "on")
            .with_property("attr_shared_mode", "eco");

        let values = device.telemetry_values();
        assert_eq!(values.get("temperature").map(String::as_str), Some("21.5"));
        assert_eq!(values.get("power").map(String::as_str), Some("on"));
        assert!(!values.contains_key("attr_shared_mode"));
        assert!(!values.contains_key("mode"));
    }

    #[test]
    fn scoped_attributes_select_one_namespace() {
        let device = Device::new("lamp", "light", ConnectionProtocol::Virtual)
            .with_property("attr_client_nickname", "desk lamp")
            .with_property("attr_shared_mode", "eco")
            .with_property("tb_power", "on");

        let shared = device.scoped_attributes(AttributeScope::Shared);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared.get("mode").map(String::as_str), Some("eco"));
    }

    #[test]
    fn wire_names_match_remote_enum() {
        assert_eq!(ConnectionProtocol::ZWave.to_string(), "Z_WAVE");
        assert_eq!(DeviceStatus::Online.to_string(), "ONLINE");
        assert_eq!(
            serde_json::to_string(&ConnectionProtocol::ZWave).unwrap(),
            "\"Z_WAVE\""
        );
    }

    #[test]
    fn empty_token_is_not_a_credential() {
        let mut device = Device::new("lamp", "light", ConnectionProtocol::Virtual);
        assert!(!device.has_remote_credential());
        device.thingsboard_token = Some(String::new());
        assert!(!device.has_remote_credential());
        device.thingsboard_token = Some("tok".into());
        assert!(device.has_remote_credential());
    }
}
