//! Device store collaborator interface.
//!
//! The synchronization engine never owns persistence; it reads and writes
//! device records through this trait. The real implementation lives in the
//! CRUD layer; [`InMemoryDeviceStore`] backs tests, demos and single-process
//! deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::device::{Device, DeviceStatus};

/// Read/write access to device records.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Look up a single device.
    async fn find_by_id(&self, id: Uuid) -> Option<Device>;

    /// All known devices.
    async fn find_all(&self) -> Vec<Device>;

    /// Devices currently in the given status.
    async fn find_by_status(&self, status: DeviceStatus) -> Vec<Device>;

    /// Devices eligible for remote synchronization (non-empty credential).
    async fn find_with_remote_credential(&self) -> Vec<Device>;

    /// Device holding the given remote access credential, if any.
    async fn find_by_remote_token(&self, token: &str) -> Option<Device>;

    /// Idempotent upsert; returns the stored record.
    async fn save(&self, device: Device) -> Device;
}

/// Concurrency-safe in-memory device store.
#[derive(Debug, Default)]
pub struct InMemoryDeviceStore {
    devices: DashMap<Uuid, Device>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn find_by_id(&self, id: Uuid) -> Option<Device> {
        self.devices.get(&id).map(|entry| entry.value().clone())
    }

    async fn find_all(&self) -> Vec<Device> {
        self.devices.iter().map(|entry| entry.value().clone()).collect()
    }

    async fn find_by_status(&self, status: DeviceStatus) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn find_with_remote_credential(&self) -> Vec<Device> {
        self.devices
            .iter()
            .filter(|entry| entry.value().has_remote_credential())
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn find_by_remote_token(&self, token: &str) -> Option<Device> {
        self.devices
            .iter()
            .find(|entry| entry.value().thingsboard_token.as_deref() == Some(token))
            .map(|entry| entry.value().clone())
    }

    async fn save(&self, device: Device) -> Device {
        tracing::debug!("saving device {} ({})", device.name, device.id);
        self.devices.insert(device.id, device.clone());
        device
    }
}
