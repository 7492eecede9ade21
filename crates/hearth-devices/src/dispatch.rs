//! Protocol-keyed adapter registry and dispatch.
//!
//! Exactly one adapter serves each protocol; the registry is populated at
//! construction time and never changes afterwards. Dispatch fails closed:
//! an unregistered protocol or an adapter error yields `false` (or an empty
//! property map) with a logged warning, never a propagated error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use hearth_core::{ConnectionProtocol, Device};

use crate::adapter::ProtocolAdapter;
use crate::stub::StubAdapter;
use crate::virtual_device::VirtualDeviceAdapter;

/// Routes device operations to the adapter registered for the device's
/// protocol.
#[derive(Default)]
pub struct AdapterDispatch {
    adapters: HashMap<ConnectionProtocol, Arc<dyn ProtocolAdapter>>,
}

impl AdapterDispatch {
    /// Create an empty dispatch with no registered adapters.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard wiring: the simulator for VIRTUAL devices and the stub
    /// adapter for MQTT, which has no live transport in this process.
    pub fn standard() -> Self {
        Self::new()
            .register(ConnectionProtocol::Virtual, Arc::new(VirtualDeviceAdapter::new()))
            .register(ConnectionProtocol::Mqtt, Arc::new(StubAdapter::new()))
    }

    /// Register the adapter responsible for a protocol.
    pub fn register(
        mut self,
        protocol: ConnectionProtocol,
        adapter: Arc<dyn ProtocolAdapter>,
    ) -> Self {
        tracing::info!("registered {} adapter for protocol {}", adapter.name(), protocol);
        self.adapters.insert(protocol, adapter);
        self
    }

    fn adapter_for(&self, device: &Device) -> Option<&Arc<dyn ProtocolAdapter>> {
        self.adapters.get(&device.protocol)
    }

    /// Send a command to a device through its protocol adapter.
    pub async fn send_command(
        &self,
        device: &Device,
        command: &str,
        parameters: &HashMap<String, String>,
    ) -> bool {
        let Some(adapter) = self.adapter_for(device) else {
            warn!(
                "no adapter registered for protocol {} of device {}",
                device.protocol, device.name
            );
            return false;
        };
        match adapter.send_command(device, command, parameters).await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(
                    "command {} on device {} failed: {}",
                    command, device.name, err
                );
                false
            }
        }
    }

    /// Check device liveness through its protocol adapter.
    pub async fn check_liveness(&self, device: &Device) -> bool {
        let Some(adapter) = self.adapter_for(device) else {
            warn!(
                "no adapter registered for protocol {} of device {}",
                device.protocol, device.name
            );
            return false;
        };
        match adapter.check_liveness(device).await {
            Ok(alive) => alive,
            Err(err) => {
                warn!("liveness check for device {} failed: {}", device.name, err);
                false
            }
        }
    }

    /// Fetch the device's current properties through its protocol adapter.
    pub async fn fetch_properties(&self, device: &Device) -> HashMap<String, String> {
        let Some(adapter) = self.adapter_for(device) else {
            warn!(
                "no adapter registered for protocol {} of device {}",
                device.protocol, device.name
            );
            return HashMap::new();
        };
        match adapter.fetch_properties(device).await {
            Ok(properties) => properties,
            Err(err) => {
                warn!("property fetch for device {} failed: {}", device.name, err);
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterError, AdapterResult};
    use async_trait::async_trait;

    struct FailingAdapter;

    #[async_trait]
    impl ProtocolAdapter for FailingAdapter {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn send_command(
            &self,
            _device: &Device,
            _command: &str,
            _parameters: &HashMap<String, String>,
        ) -> AdapterResult<bool> {
            Err(AdapterError::Communication("wire down".into()))
        }

        async fn check_liveness(&self, _device: &Device) -> AdapterResult<bool> {
            Err(AdapterError::Timeout(1000))
        }

        async fn fetch_properties(
            &self,
            _device: &Device,
        ) -> AdapterResult<HashMap<String, String>> {
            Err(AdapterError::Communication("wire down".into()))
        }
    }

    #[tokio::test]
    async fn unregistered_protocol_fails_closed() {
        let dispatch = AdapterDispatch::new();
        let device = Device::new("lamp", "light", ConnectionProtocol::Zigbee);

        assert!(!dispatch.send_command(&device, "power", &HashMap::new()).await);
        assert!(!dispatch.check_liveness(&device).await);
        assert!(dispatch.fetch_properties(&device).await.is_empty());
    }

    #[tokio::test]
    async fn adapter_errors_become_failure_results() {
        let dispatch =
            AdapterDispatch::new().register(ConnectionProtocol::Zigbee, Arc::new(FailingAdapter));
        let device = Device::new("lamp", "light", ConnectionProtocol::Zigbee);

        assert!(!dispatch.send_command(&device, "power", &HashMap::new()).await);
        assert!(!dispatch.check_liveness(&device).await);
        assert!(dispatch.fetch_properties(&device).await.is_empty());
    }

    #[tokio::test]
    async fn standard_wiring_serves_virtual_devices() {
        let dispatch = AdapterDispatch::standard();
        let device = Device::new("lamp", "light", ConnectionProtocol::Virtual);

        // First contact with an unseen virtual device always seeds it.
        assert!(dispatch.check_liveness(&device).await);
        let properties = dispatch.fetch_properties(&device).await;
        assert!(properties.contains_key("power"));
    }
}
