//! Stub adapter for protocols without a live transport.
//!
//! Stands in when no broker or radio is configured: commands are applied to
//! a plain per-device state map, liveness always succeeds and unseen devices
//! are served type-appropriate demo properties. Useful for demos and for
//! keeping a deployment functional while the real transport is absent.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use hearth_core::Device;

use crate::adapter::{AdapterResult, ProtocolAdapter};

/// No-transport protocol adapter.
#[derive(Default)]
pub struct StubAdapter {
    states: DashMap<String, HashMap<String, String>>,
}

impl StubAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn demo_values(device: &Device) -> HashMap<String, String> {
        let mut values = HashMap::new();
        match device.device_type.as_str() {
            "light" => {
                values.insert("state".into(), "off".into());
                values.insert("brightness".into(), "50".into());
                values.insert("color".into(), "warm".into());
            }
            "thermostat" => {
                values.insert("temperature".into(), "21.5".into());
                values.insert("mode".into(), "auto".into());
                values.insert("target".into(), "22.0".into());
            }
            "sensor" => {
                values.insert("temperature".into(), "23.2".into());
                values.insert("humidity".into(), "45".into());
                values.insert("battery".into(), "87".into());
            }
            _ => {
                values.insert("status".into(), "ready".into());
            }
        }
        values
    }
}

#[async_trait]
impl ProtocolAdapter for StubAdapter {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn send_command(
        &self,
        device: &Device,
        command: &str,
        parameters: &HashMap<String, String>,
    ) -> AdapterResult<bool> {
        debug!(
            "stubbed command {} for device {} with parameters {:?}",
            command, device.name, parameters
        );

        let mut state = self.states.entry(device.id.to_string()).or_default();
        match command {
            "setState" => {
                state.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            "setValue" => {
                if let (Some(property), Some(value)) =
                    (parameters.get("property"), parameters.get("value"))
                {
                    state.insert(property.clone(), value.clone());
                }
            }
            _ => {}
        }
        Ok(true)
    }

    async fn check_liveness(&self, device: &Device) -> AdapterResult<bool> {
        debug!("stubbed liveness check for device {}", device.name);
        Ok(true)
    }

    async fn fetch_properties(&self, device: &Device) -> AdapterResult<HashMap<String, String>> {
        let state = self
            .states
            .entry(device.id.to_string())
            .or_insert_with(|| Self::demo_values(device));
        Ok(state.clone())
    }
}
