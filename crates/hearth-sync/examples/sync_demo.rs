//! Synchronization engine demo.
//!
//! Runs entirely against the in-memory store and the virtual device
//! simulator:
//! 1. AdapterDispatch routing commands to the simulator
//! 2. Property drift on repeated reads
//! 3. A liveness scan demoting a silent device
//!
//! Point `HEARTH_TB_URL` at a running ThingsBoard instance to also start the
//! reconciliation scheduler against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hearth_core::{ConnectionProtocol, Device, DeviceStatus, DeviceStore, InMemoryDeviceStore};
use hearth_devices::{AdapterDispatch, VirtualAdapterConfig, VirtualDeviceAdapter};
use hearth_sync::{
    LivenessConfig, LivenessMonitor, ReconciliationEngine, SyncConfig, SyncScheduler,
    ThingsBoardClient, ThingsBoardConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("=== Hearth Synchronization Demo ===\n");

    let store = Arc::new(InMemoryDeviceStore::new());
    let dispatch = Arc::new(AdapterDispatch::new().register(
        ConnectionProtocol::Virtual,
        Arc::new(VirtualDeviceAdapter::with_config(VirtualAdapterConfig {
            quiet_interval: Duration::from_millis(100),
            ..VirtualAdapterConfig::default()
        })),
    ));

    // --- A virtual light, driven through the dispatch layer ---
    let mut lamp = Device::new("Living Room Lamp", "light", ConnectionProtocol::Virtual);
    lamp.status = DeviceStatus::Online;
    lamp.touch();
    let lamp = store.save(lamp).await;

    let mut parameters = HashMap::new();
    parameters.insert("power".to_string(), "on".to_string());
    parameters.insert("brightness".to_string(), "70".to_string());
    let accepted = dispatch.send_command(&lamp, "setState", &parameters).await;
    println!("setState accepted: {accepted}");
    println!("lamp properties: {:?}\n", dispatch.fetch_properties(&lamp).await);

    // --- A virtual sensor, drifting between reads ---
    let mut sensor = Device::new("Attic Sensor", "sensor", ConnectionProtocol::Virtual);
    sensor.status = DeviceStatus::Online;
    // No last_seen: this device has never been heard from.
    let sensor = store.save(sensor).await;

    println!("sensor reading 1: {:?}", dispatch.fetch_properties(&sensor).await);
    tokio::time::sleep(Duration::from_millis(150)).await;
    println!("sensor reading 2: {:?}\n", dispatch.fetch_properties(&sensor).await);

    // --- One liveness scan ---
    let monitor = Arc::new(LivenessMonitor::with_config(
        store.clone(),
        dispatch.clone(),
        LivenessConfig::new(Duration::from_secs(60), Duration::from_secs(300)),
    ));
    monitor.scan().await;
    for device in store.find_all().await {
        println!("{}: {}", device.name, device.status);
    }

    // --- Optional: full scheduler against a real remote platform ---
    if std::env::var("HEARTH_TB_URL").is_ok() {
        let client = Arc::new(ThingsBoardClient::new(ThingsBoardConfig::from_env())?);
        let engine = Arc::new(ReconciliationEngine::with_config(
            client,
            store.clone(),
            SyncConfig::from_env(),
        ));
        let scheduler = SyncScheduler::start(engine, monitor, SyncConfig::from_env());
        println!("\nscheduler running against the remote platform, ctrl-c to stop");
        tokio::signal::ctrl_c().await?;
        scheduler.shutdown();
    }

    Ok(())
}
