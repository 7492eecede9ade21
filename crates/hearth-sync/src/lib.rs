//! Device-state synchronization against the remote IoT platform.
//!
//! The engine mirrors local device records against a ThingsBoard-compatible
//! platform holding attributes in three scopes (CLIENT/SHARED/SERVER) and
//! time-series telemetry:
//!
//! - [`ThingsBoardClient`] owns the session, provisioning and the scoped
//!   attribute/telemetry wire calls; the engine consumes it through the
//!   [`RemotePlatform`] trait so tests can substitute a mock.
//! - [`ReconciliationEngine`] runs the scheduled pull passes (attribute and
//!   telemetry, independently cadenced), repairs drift in the namespaced
//!   property map and pushes local state outward.
//! - [`LivenessMonitor`] demotes unreachable devices and promotes them back
//!   on a positive adapter check.
//! - [`SyncScheduler`] wires the periodic passes onto the runtime.
//!
//! Synchronization is eventual and poll-based; no failure on one device is
//! allowed to abort a pass over the others.

pub mod client;
pub mod config;
pub mod error;
pub mod liveness;
pub mod reconcile;
pub mod remote;
pub mod scheduler;
pub mod telemetry;

pub use client::ThingsBoardClient;
pub use config::{SyncConfig, ThingsBoardConfig};
pub use error::SyncError;
pub use liveness::{LivenessConfig, LivenessMonitor};
pub use reconcile::ReconciliationEngine;
pub use remote::{RemoteDeviceInfo, RemotePlatform, ScopedAttributes};
pub use scheduler::SyncScheduler;
pub use telemetry::{scalar_to_string, TelemetryPoint, TelemetryValue};
