//! Bidirectional reconciliation between local device records and the remote
//! platform.
//!
//! Two independent scheduled pull passes (attributes, telemetry) diff the
//! remote state against the namespaced property map, writing only values
//! that actually changed and removing keys that disappeared upstream. A
//! third pass pushes local telemetry outward. Every device is reconciled in
//! isolation: one device's network or parse failure is logged and skipped,
//! never aborting the batch. A device is saved at most once per pass, and
//! only when at least one field changed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hearth_core::{
    AttributeScope, ConnectionProtocol, Device, DeviceStatus, DeviceStore, TELEMETRY_PREFIX,
};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::remote::RemotePlatform;
use crate::telemetry::{scalar_to_string, TelemetryValue};

/// The reconciliation engine.
///
/// Generic over the remote platform and the device store so both sides can
/// be substituted in tests.
pub struct ReconciliationEngine<R, S> {
    remote: Arc<R>,
    store: Arc<S>,
    config: SyncConfig,
}

impl<R, S> ReconciliationEngine<R, S>
where
    R: RemotePlatform,
    S: DeviceStore,
{
    pub fn new(remote: Arc<R>, store: Arc<S>) -> Self {
        Self::with_config(remote, store, SyncConfig::default())
    }

    pub fn with_config(remote: Arc<R>, store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            remote,
            store,
            config,
        }
    }

    /// Pull CLIENT/SHARED/SERVER attributes for every credentialed device.
    /// Returns how many devices were updated.
    pub async fn run_attribute_pass(&self) -> usize {
        let devices = self.store.find_with_remote_credential().await;
        if devices.is_empty() {
            debug!("no credentialed devices to reconcile");
            return 0;
        }

        info!("reconciling attributes for {} devices", devices.len());
        let updated = AtomicUsize::new(0);
        futures::stream::iter(devices)
            .for_each_concurrent(self.config.max_concurrency.max(1), |device| {
                let updated = &updated;
                async move {
                    let name = device.name.clone();
                    match self.sync_device_attributes(device).await {
                        Ok(true) => {
                            updated.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(err) => error!("attribute sync for device {} failed: {}", name, err),
                    }
                }
            })
            .await;

        let updated = updated.into_inner();
        info!("attribute reconciliation finished, {} devices updated", updated);
        updated
    }

    /// Pull the latest telemetry for every credentialed device. Returns how
    /// many devices were updated.
    pub async fn run_telemetry_pass(&self) -> usize {
        let devices = self.store.find_with_remote_credential().await;
        if devices.is_empty() {
            debug!("no credentialed devices for telemetry reconciliation");
            return 0;
        }

        info!("reconciling telemetry for {} devices", devices.len());
        let updated = AtomicUsize::new(0);
        futures::stream::iter(devices)
            .for_each_concurrent(self.config.max_concurrency.max(1), |device| {
                let updated = &updated;
                async move {
                    let name = device.name.clone();
                    match self.sync_device_telemetry(device).await {
                        Ok(true) => {
                            updated.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(false) => {}
                        Err(err) => error!("telemetry sync for device {} failed: {}", name, err),
                    }
                }
            })
            .await;

        let updated = updated.into_inner();
        info!("telemetry reconciliation finished, {} devices updated", updated);
        updated
    }

    /// Push local telemetry outward for every credentialed device. Returns
    /// how many pushes succeeded.
    pub async fn run_push_pass(&self) -> usize {
        let devices = self.store.find_with_remote_credential().await;
        if devices.is_empty() {
            debug!("no credentialed devices to push");
            return 0;
        }

        info!("pushing state for {} devices", devices.len());
        let pushed = AtomicUsize::new(0);
        futures::stream::iter(devices)
            .for_each_concurrent(self.config.max_concurrency.max(1), |device| {
                let pushed = &pushed;
                async move {
                    match self
                        .remote
                        .push_telemetry(&device, device.telemetry_values())
                        .await
                    {
                        Ok(()) => {
                            pushed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            error!("push for device {} failed: {}", device.name, err);
                        }
                    }
                }
            })
            .await;

        let pushed = pushed.into_inner();
        info!("outward push finished, {} devices pushed", pushed);
        pushed
    }

    /// Attribute + telemetry sync for a single device, on demand.
    pub async fn force_sync_device(&self, id: Uuid) -> bool {
        let Some(device) = self.store.find_by_id(id).await else {
            warn!("device {} not found", id);
            return false;
        };

        let attributes_updated = match self.sync_device_attributes(device).await {
            Ok(updated) => updated,
            Err(err) => {
                error!("forced attribute sync for device {} failed: {}", id, err);
                false
            }
        };

        // Re-read so the telemetry step sees what the attribute step saved.
        let telemetry_updated = match self.store.find_by_id(id).await {
            Some(device) => match self.sync_device_telemetry(device).await {
                Ok(updated) => updated,
                Err(err) => {
                    error!("forced telemetry sync for device {} failed: {}", id, err);
                    false
                }
            },
            None => false,
        };

        attributes_updated || telemetry_updated
    }

    /// Telemetry pass for every credentialed device, on demand.
    pub async fn force_sync_all_telemetry(&self) -> usize {
        self.run_telemetry_pass().await
    }

    /// Import devices that exist remotely but not locally. Returns the
    /// number of newly created records.
    pub async fn import_remote_devices(&self) -> usize {
        info!("importing devices from the remote platform");
        let remote_devices = match self.remote.list_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                error!("remote device list unavailable: {}", err);
                return 0;
            }
        };
        let total = remote_devices.len();

        let mut imported = 0;
        for info in remote_devices {
            let token = match self.remote.device_credentials(&info.id).await {
                Ok(token) => token,
                Err(err) => {
                    warn!("no credential for remote device {}: {}", info.name, err);
                    continue;
                }
            };
            if self.store.find_by_remote_token(&token).await.is_some() {
                debug!("device with this credential already exists, skipping {}", info.name);
                continue;
            }

            let mut device =
                Device::new(info.name.clone(), info.device_type, ConnectionProtocol::Virtual);
            device.status = DeviceStatus::Online;
            device.touch();
            device.thingsboard_token = Some(token);
            device.thingsboard_device_id = Some(info.id);
            device.manufacturer = info.manufacturer;
            device.model = info.model;
            device.firmware_version = info.firmware_version;
            if let Some(label) = info.label {
                device.properties.insert("label".to_string(), label);
            }

            let device = self.store.save(device).await;

            // Initial state pull; failures only degrade the fresh record.
            if let Err(err) = self.sync_device_attributes(device.clone()).await {
                warn!("initial attribute sync for {} failed: {}", device.name, err);
            }
            if let Some(fresh) = self.store.find_by_id(device.id).await {
                if let Err(err) = self.sync_device_telemetry(fresh).await {
                    warn!("initial telemetry sync for {} failed: {}", device.name, err);
                }
            }

            imported += 1;
            info!("imported device {}", info.name);
        }

        info!("device import finished: {}/{} imported", imported, total);
        imported
    }

    /// Reconcile one device's attributes across all three scopes.
    ///
    /// CLIENT and SHARED come from the public endpoint; SERVER needs the
    /// session and the resolved remote identity. A namespace is only pruned
    /// when its scope was actually fetched, so a partial failure never wipes
    /// state it is not authoritative for.
    async fn sync_device_attributes(&self, mut device: Device) -> Result<bool, SyncError> {
        let Some(token) = device.thingsboard_token.clone().filter(|t| !t.is_empty()) else {
            debug!("device {} has no credential, skipping attribute sync", device.name);
            return Ok(false);
        };

        let mut updated = false;
        let scoped = self.remote.fetch_attributes(&token).await?;

        let mut client_keys = HashSet::new();
        for (key, value) in &scoped.client {
            client_keys.insert(key.clone());
            if apply_metadata_attribute(&mut device, key, value) {
                updated = true;
                continue;
            }
            if is_metadata_key(key) {
                continue;
            }
            if write_attribute(&mut device, AttributeScope::Client, key, value) {
                updated = true;
            }
        }

        let mut shared_keys = HashSet::new();
        for (key, value) in &scoped.shared {
            shared_keys.insert(key.clone());
            if write_attribute(&mut device, AttributeScope::Shared, key, value) {
                updated = true;
            }
        }

        // SERVER scope is session-gated; its failure must not block the
        // public scopes or wipe the server namespace.
        let server_keys = match self.ensure_remote_id(&mut device, &token, &mut updated).await {
            Ok(remote_id) => match self.remote.fetch_server_attributes(&remote_id).await {
                Ok(attributes) => {
                    let mut keys = HashSet::new();
                    for (key, value) in &attributes {
                        keys.insert(key.clone());
                        if write_attribute(&mut device, AttributeScope::Server, key, value) {
                            updated = true;
                        }
                    }
                    Some(keys)
                }
                Err(err) => {
                    warn!(
                        "server attributes for device {} unavailable: {}",
                        device.name, err
                    );
                    None
                }
            },
            Err(err) => {
                warn!(
                    "remote identity for device {} unresolved: {}",
                    device.name, err
                );
                None
            }
        };

        if prune_namespace(&mut device, AttributeScope::Client.prefix(), Some(&client_keys)) {
            updated = true;
        }
        if prune_namespace(&mut device, AttributeScope::Shared.prefix(), Some(&shared_keys)) {
            updated = true;
        }
        if prune_namespace(&mut device, AttributeScope::Server.prefix(), server_keys.as_ref()) {
            updated = true;
        }

        if updated {
            self.store.save(device).await;
        }
        Ok(updated)
    }

    /// Reconcile one device's telemetry mirror.
    async fn sync_device_telemetry(&self, mut device: Device) -> Result<bool, SyncError> {
        let Some(token) = device.thingsboard_token.clone().filter(|t| !t.is_empty()) else {
            debug!("device {} has no credential, skipping telemetry sync", device.name);
            return Ok(false);
        };

        let mut updated = false;
        let remote_id = self.ensure_remote_id(&mut device, &token, &mut updated).await?;

        let telemetry = self.remote.fetch_latest_telemetry(&remote_id).await?;
        if telemetry.is_empty() {
            // Some deployments omit bulk results; probe the well-known keys
            // individually. Coverage is not complete, so nothing is pruned.
            warn!(
                "no bulk telemetry for device {}, probing {} known keys",
                device.name,
                self.config.probe_keys.len()
            );
            for key in &self.config.probe_keys {
                match self.remote.fetch_telemetry_key(&remote_id, key).await {
                    Ok(Some(value)) => {
                        if write_telemetry(&mut device, key, &value) {
                            updated = true;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => debug!("telemetry probe for key {} failed: {}", key, err),
                }
            }
        } else {
            let live: HashSet<String> = telemetry.keys().cloned().collect();
            if prune_namespace(&mut device, TELEMETRY_PREFIX, Some(&live)) {
                updated = true;
            }
            for (key, value) in &telemetry {
                if write_telemetry(&mut device, key, value) {
                    updated = true;
                }
            }
        }

        if updated {
            self.store.save(device).await;
        }
        Ok(updated)
    }

    /// Remote identity of a device, resolved lazily and cached on the
    /// record. A successful resolution marks the device as changed.
    async fn ensure_remote_id(
        &self,
        device: &mut Device,
        token: &str,
        updated: &mut bool,
    ) -> Result<String, SyncError> {
        if let Some(id) = device
            .thingsboard_device_id
            .clone()
            .filter(|i| !i.is_empty())
        {
            return Ok(id);
        }
        let id = self.remote.resolve_device_id(token).await?;
        device.thingsboard_device_id = Some(id.clone());
        *updated = true;
        Ok(id)
    }
}

const METADATA_KEYS: [&str; 4] = ["name", "manufacturer", "model", "firmwareVersion"];

fn is_metadata_key(key: &str) -> bool {
    METADATA_KEYS.contains(&key)
}

/// Metadata attributes bypass the namespace convention and update dedicated
/// device fields. Returns true if a field changed.
fn apply_metadata_attribute(device: &mut Device, key: &str, value: &Value) -> bool {
    let Some(value) = scalar_to_string(value) else {
        return false;
    };
    match key {
        "name" => {
            if device.name != value {
                device.name = value;
                return true;
            }
        }
        "manufacturer" => {
            if device.manufacturer.as_deref() != Some(value.as_str()) {
                device.manufacturer = Some(value);
                return true;
            }
        }
        "model" => {
            if device.model.as_deref() != Some(value.as_str()) {
                device.model = Some(value);
                return true;
            }
        }
        "firmwareVersion" => {
            if device.firmware_version.as_deref() != Some(value.as_str()) {
                device.firmware_version = Some(value);
                return true;
            }
        }
        _ => {}
    }
    false
}

/// Write one remote attribute into its namespace, value-level idempotent.
fn write_attribute(device: &mut Device, scope: AttributeScope, key: &str, value: &Value) -> bool {
    let Some(value) = scalar_to_string(value) else {
        return false;
    };
    let local_key = scope.local_key(key);
    if device.properties.get(&local_key) == Some(&value) {
        return false;
    }
    info!(
        "updated {} attribute {} of device {}: {:?} -> {}",
        scope,
        key,
        device.name,
        device.properties.get(&local_key),
        value
    );
    device.properties.insert(local_key, value);
    true
}

/// Write one telemetry value under its `tb_` key, value-level idempotent.
fn write_telemetry(device: &mut Device, key: &str, value: &TelemetryValue) -> bool {
    let Some(value) = value.as_scalar_string() else {
        return false;
    };
    let local_key = format!("{TELEMETRY_PREFIX}{key}");
    if device.properties.get(&local_key) == Some(&value) {
        return false;
    }
    info!(
        "updated telemetry {} of device {}: {:?} -> {}",
        key,
        device.name,
        device.properties.get(&local_key),
        value
    );
    device.properties.insert(local_key, value);
    true
}

/// Drift repair: drop every key of one namespace whose remote counterpart
/// disappeared. `None` means the scope was not fetched this pass; nothing is
/// pruned then. Returns true if anything was removed.
fn prune_namespace(device: &mut Device, prefix: &str, live: Option<&HashSet<String>>) -> bool {
    let Some(live) = live else {
        return false;
    };
    let stale: Vec<String> = device
        .properties
        .keys()
        .filter(|key| {
            key.strip_prefix(prefix)
                .is_some_and(|remote_key| !live.contains(remote_key))
        })
        .cloned()
        .collect();

    for key in &stale {
        device.properties.remove(key);
        info!("removed stale property {} of device {}", key, device.name);
    }
    !stale.is_empty()
}
