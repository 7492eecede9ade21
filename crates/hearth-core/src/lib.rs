//! Core domain model for the Hearth smart-home platform.
//!
//! This crate holds the `Device` aggregate, the protocol/status enums and the
//! `DeviceStore` collaborator trait that the synchronization engine talks to.
//! Persistence of entity records lives outside the core; the in-memory store
//! provided here backs tests, demos and single-process deployments.

pub mod device;
pub mod store;

pub use device::{
    is_namespaced_key, AttributeScope, ConnectionProtocol, Device, DeviceStatus,
    ATTR_CLIENT_PREFIX, ATTR_SERVER_PREFIX, ATTR_SHARED_PREFIX, TELEMETRY_PREFIX,
};
pub use store::{DeviceStore, InMemoryDeviceStore};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
