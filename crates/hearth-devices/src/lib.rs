//! Protocol adapters for the Hearth smart-home platform.
//!
//! Inbound device operations go through [`AdapterDispatch`], which routes
//! each call to the one adapter registered for the device's protocol and
//! fails closed when no adapter is registered or the adapter errors. The
//! [`VirtualDeviceAdapter`] simulates devices with drifting telemetry; the
//! [`StubAdapter`] stands in for protocols without a live transport.

pub mod adapter;
pub mod dispatch;
pub mod stub;
pub mod virtual_device;

pub use adapter::{AdapterError, AdapterResult, ProtocolAdapter};
pub use dispatch::AdapterDispatch;
pub use stub::StubAdapter;
pub use virtual_device::{VirtualAdapterConfig, VirtualDeviceAdapter};
