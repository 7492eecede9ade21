//! Liveness monitor tests with deterministic adapters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use hearth_core::{ConnectionProtocol, Device, DeviceStatus, DeviceStore, InMemoryDeviceStore};
use hearth_devices::{AdapterDispatch, AdapterResult, ProtocolAdapter};
use hearth_sync::{LivenessConfig, LivenessMonitor};

/// Adapter with a fixed liveness answer.
struct FixedAdapter {
    alive: bool,
}

#[async_trait]
impl ProtocolAdapter for FixedAdapter {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn send_command(
        &self,
        _device: &Device,
        _command: &str,
        _parameters: &HashMap<String, String>,
    ) -> AdapterResult<bool> {
        Ok(true)
    }

    async fn check_liveness(&self, _device: &Device) -> AdapterResult<bool> {
        Ok(self.alive)
    }

    async fn fetch_properties(&self, _device: &Device) -> AdapterResult<HashMap<String, String>> {
        Ok(HashMap::new())
    }
}

fn monitor_with(
    store: Arc<InMemoryDeviceStore>,
    alive: bool,
) -> LivenessMonitor<InMemoryDeviceStore> {
    let dispatch = AdapterDispatch::new().register(
        ConnectionProtocol::Zigbee,
        Arc::new(FixedAdapter { alive }),
    );
    LivenessMonitor::with_config(
        store,
        Arc::new(dispatch),
        LivenessConfig::new(Duration::from_secs(60), Duration::from_secs(300)),
    )
}

fn online_device(name: &str) -> Device {
    let mut device = Device::new(name, "sensor", ConnectionProtocol::Zigbee);
    device.status = DeviceStatus::Online;
    device.touch();
    device
}

#[tokio::test]
async fn stale_devices_are_demoted_without_consulting_the_adapter() {
    let store = Arc::new(InMemoryDeviceStore::new());
    let mut device = online_device("quiet");
    device.last_seen = Some(Utc::now() - chrono::Duration::minutes(10));
    let id = device.id;
    store.save(device).await;

    // The adapter would report the device alive; the timeout wins anyway.
    let monitor = monitor_with(store.clone(), true);
    monitor.scan().await;

    let device = store.find_by_id(id).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Offline);
}

#[tokio::test]
async fn fresh_devices_stay_online_on_a_positive_check() {
    let store = Arc::new(InMemoryDeviceStore::new());
    let device = online_device("chatty");
    let id = device.id;
    store.save(device).await;

    let monitor = monitor_with(store.clone(), true);
    monitor.scan().await;

    let device = store.find_by_id(id).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
}

#[tokio::test]
async fn negative_adapter_check_demotes_a_fresh_device() {
    let store = Arc::new(InMemoryDeviceStore::new());
    let device = online_device("flaky");
    let id = device.id;
    store.save(device).await;

    let monitor = monitor_with(store.clone(), false);
    monitor.scan().await;

    let device = store.find_by_id(id).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Offline);
}

#[tokio::test]
async fn offline_devices_promote_only_on_a_positive_check() {
    let store = Arc::new(InMemoryDeviceStore::new());
    let device = Device::new("dark", "sensor", ConnectionProtocol::Zigbee);
    let id = device.id;
    store.save(device).await;

    let monitor = monitor_with(store.clone(), false);
    monitor.scan().await;
    assert_eq!(
        store.find_by_id(id).await.unwrap().status,
        DeviceStatus::Offline
    );

    let monitor = monitor_with(store.clone(), true);
    monitor.scan().await;
    let device = store.find_by_id(id).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    assert!(device.last_seen.is_some());
}

#[tokio::test]
async fn a_timeout_demotion_is_not_undone_within_the_same_scan() {
    let store = Arc::new(InMemoryDeviceStore::new());
    let mut device = online_device("quiet");
    device.last_seen = Some(Utc::now() - chrono::Duration::minutes(10));
    let id = device.id;
    store.save(device).await;

    let monitor = monitor_with(store.clone(), true);
    monitor.scan().await;
    assert_eq!(
        store.find_by_id(id).await.unwrap().status,
        DeviceStatus::Offline
    );

    // The next scan sees the device offline and the adapter positive; only
    // then is it promoted, with a fresh last_seen.
    monitor.scan().await;
    let device = store.find_by_id(id).await.unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    let last_seen = device.last_seen.expect("promotion refreshes last_seen");
    assert!(Utc::now().signed_duration_since(last_seen) < chrono::Duration::minutes(1));
}

#[tokio::test]
async fn devices_without_an_adapter_fail_closed_to_offline() {
    let store = Arc::new(InMemoryDeviceStore::new());
    let device = online_device("orphan");
    let id = device.id;
    store.save(device).await;

    // No adapter registered at all: the liveness check fails closed.
    let monitor = LivenessMonitor::with_config(
        store.clone(),
        Arc::new(AdapterDispatch::new()),
        LivenessConfig::default(),
    );
    monitor.scan().await;

    assert_eq!(
        store.find_by_id(id).await.unwrap().status,
        DeviceStatus::Offline
    );
}
