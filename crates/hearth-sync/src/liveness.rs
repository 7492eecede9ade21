//! Device liveness monitoring.
//!
//! A scheduled scan demotes ONLINE devices on two independent triggers: a
//! stale `last_seen` (timeout, the adapter is not consulted) or a negative
//! adapter liveness check. OFFLINE devices are promoted back, with
//! `last_seen` refreshed, only on a positive adapter check; a timeout alone
//! never promotes. Transitions are logged; recovery beyond the next
//! scheduled pass is not attempted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use hearth_core::{DeviceStatus, DeviceStore};
use hearth_devices::AdapterDispatch;

/// Liveness scan configuration.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Scan cadence (default: 60 s)
    pub scan_interval: Duration,
    /// Grace period before a silent device counts as gone (default: 5 min)
    pub offline_timeout: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(60),
            offline_timeout: Duration::from_secs(300),
        }
    }
}

impl LivenessConfig {
    pub fn new(scan_interval: Duration, offline_timeout: Duration) -> Self {
        Self {
            scan_interval,
            offline_timeout,
        }
    }

    /// Whether a device with this `last_seen` has exceeded the grace period.
    /// A device that was never seen is judged by its adapter instead.
    pub fn is_stale(&self, last_seen: Option<DateTime<Utc>>) -> bool {
        let Some(last_seen) = last_seen else {
            return false;
        };
        let Ok(grace) = chrono::Duration::from_std(self.offline_timeout) else {
            return false;
        };
        Utc::now().signed_duration_since(last_seen) > grace
    }
}

/// Scheduled online/offline state keeper.
pub struct LivenessMonitor<S> {
    store: Arc<S>,
    dispatch: Arc<AdapterDispatch>,
    config: LivenessConfig,
}

impl<S> LivenessMonitor<S>
where
    S: DeviceStore,
{
    pub fn new(store: Arc<S>, dispatch: Arc<AdapterDispatch>) -> Self {
        Self::with_config(store, dispatch, LivenessConfig::default())
    }

    pub fn with_config(store: Arc<S>, dispatch: Arc<AdapterDispatch>, config: LivenessConfig) -> Self {
        Self {
            store,
            dispatch,
            config,
        }
    }

    /// One full scan over online and offline devices.
    pub async fn scan(&self) {
        debug!("running device liveness scan");

        // Promotion candidates are the devices that entered the scan
        // offline; a device demoted below is reconsidered next pass.
        let offline = self.store.find_by_status(DeviceStatus::Offline).await;

        for mut device in self.store.find_by_status(DeviceStatus::Online).await {
            if self.config.is_stale(device.last_seen) {
                info!("device {} timed out, marking offline", device.name);
                device.status = DeviceStatus::Offline;
                self.store.save(device).await;
                continue;
            }

            if !self.dispatch.check_liveness(&device).await {
                info!("device {} is unreachable, marking offline", device.name);
                device.status = DeviceStatus::Offline;
                self.store.save(device).await;
            }
        }

        for mut device in offline {
            if self.dispatch.check_liveness(&device).await {
                info!("device {} is reachable again, marking online", device.name);
                device.status = DeviceStatus::Online;
                device.touch();
                self.store.save(device).await;
            }
        }
    }

    /// Spawn the periodic scan loop.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()>
    where
        S: 'static,
    {
        tokio::spawn(async move {
            let mut timer = interval(self.config.scan_interval);
            timer.tick().await; // Skip first tick

            loop {
                timer.tick().await;
                self.scan().await;
            }
        })
    }
}
