//! Periodic task wiring.
//!
//! Four independent loops share the runtime: attribute pull, telemetry pull,
//! outward push and the liveness scan. They carry no ordering guarantee
//! relative to each other or to synchronous command traffic; every pass runs
//! to completion over its device list, so shutdown only takes effect between
//! passes.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use hearth_core::DeviceStore;

use crate::config::SyncConfig;
use crate::liveness::LivenessMonitor;
use crate::reconcile::ReconciliationEngine;
use crate::remote::RemotePlatform;

/// Handle over the spawned synchronization loops.
pub struct SyncScheduler {
    handles: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Spawn all periodic passes with the cadences from `config`.
    pub fn start<R, S>(
        engine: Arc<ReconciliationEngine<R, S>>,
        monitor: Arc<LivenessMonitor<S>>,
        config: SyncConfig,
    ) -> Self
    where
        R: RemotePlatform + 'static,
        S: DeviceStore + 'static,
    {
        let mut handles = Vec::new();

        let attribute_engine = engine.clone();
        let attribute_interval = config.attribute_pull_interval;
        handles.push(tokio::spawn(async move {
            let mut timer = interval(attribute_interval);
            timer.tick().await; // Skip first tick

            loop {
                timer.tick().await;
                attribute_engine.run_attribute_pass().await;
            }
        }));

        let telemetry_engine = engine.clone();
        let telemetry_interval = config.telemetry_pull_interval;
        handles.push(tokio::spawn(async move {
            let mut timer = interval(telemetry_interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                telemetry_engine.run_telemetry_pass().await;
            }
        }));

        let push_engine = engine;
        let push_interval = config.push_interval;
        handles.push(tokio::spawn(async move {
            let mut timer = interval(push_interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                push_engine.run_push_pass().await;
            }
        }));

        handles.push(monitor.spawn());

        info!("synchronization scheduler started with {} tasks", handles.len());
        Self { handles }
    }

    /// Abort the loops.
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        info!("synchronization scheduler stopped");
    }
}
