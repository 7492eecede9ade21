//! Virtual (emulated) device adapter.
//!
//! Keeps an in-memory state map per device and simulates realistic behavior:
//! type-appropriate defaults on first contact, a small command vocabulary,
//! randomized drift of sensor readings and injected transport unreliability.
//! Used for testing and demonstration without physical devices.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use hearth_core::Device;

use crate::adapter::{AdapterResult, ProtocolAdapter};

/// Tuning knobs for the simulator.
#[derive(Debug, Clone)]
pub struct VirtualAdapterConfig {
    /// Probability that a command reports failure after being applied.
    pub command_failure_rate: f64,
    /// Probability that a liveness check reports a transient outage.
    pub outage_rate: f64,
    /// Minimum time between two drift recomputations for one device.
    pub quiet_interval: Duration,
}

impl Default for VirtualAdapterConfig {
    fn default() -> Self {
        Self {
            command_failure_rate: 0.05,
            outage_rate: 0.01,
            quiet_interval: Duration::from_secs(30),
        }
    }
}

struct VirtualState {
    values: HashMap<String, String>,
    last_update: Instant,
}

impl VirtualState {
    fn new(values: HashMap<String, String>) -> Self {
        Self {
            values,
            last_update: Instant::now(),
        }
    }
}

/// Protocol adapter simulating virtual devices.
///
/// State is keyed by device id in a concurrency-safe map; operations on
/// different devices never contend, operations on the same device are
/// serialized by the per-entry lock.
pub struct VirtualDeviceAdapter {
    config: VirtualAdapterConfig,
    states: DashMap<String, VirtualState>,
}

impl Default for VirtualDeviceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDeviceAdapter {
    pub fn new() -> Self {
        Self::with_config(VirtualAdapterConfig::default())
    }

    pub fn with_config(config: VirtualAdapterConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    /// Type-appropriate initial state for a device seen for the first time.
    fn seed_values(device: &Device) -> HashMap<String, String> {
        let mut rng = rand::thread_rng();
        let mut values = HashMap::new();
        match device.device_type.as_str() {
            "light" => {
                values.insert("power".into(), "off".into());
                values.insert("brightness".into(), "0".into());
                values.insert("color".into(), "FFFFFF".into());
            }
            "thermostat" => {
                values.insert("power".into(), "on".into());
                values.insert("mode".into(), "heat".into());
                values.insert("temperature".into(), "21.5".into());
                values.insert("target_temperature".into(), "22.0".into());
            }
            "sensor" => {
                values.insert(
                    "temperature".into(),
                    format!("{:.1}", 20.0 + rng.gen::<f64>() * 5.0),
                );
                values.insert(
                    "humidity".into(),
                    format!("{:.1}", 40.0 + rng.gen::<f64>() * 20.0),
                );
                values.insert("battery".into(), (70 + rng.gen_range(0..30)).to_string());
            }
            "switch" => {
                values.insert("state".into(), "off".into());
            }
            _ => {
                values.insert("status".into(), "unknown".into());
            }
        }
        values
    }

    /// Re-simulate sensor drift, at most once per quiet interval.
    fn apply_drift(&self, device: &Device, state: &mut VirtualState) {
        if state.last_update.elapsed() < self.config.quiet_interval {
            return;
        }

        let mut rng = rand::thread_rng();
        match device.device_type.as_str() {
            "sensor" => {
                if let Some(current) = state.values.get("temperature").and_then(|v| v.parse::<f64>().ok()) {
                    let next = current + (rng.gen::<f64>() - 0.5) * 0.5;
                    state.values.insert("temperature".into(), format!("{:.1}", next));
                }
                if let Some(current) = state.values.get("humidity").and_then(|v| v.parse::<f64>().ok()) {
                    let next = (current + (rng.gen::<f64>() - 0.5) * 2.0).clamp(0.0, 100.0);
                    state.values.insert("humidity".into(), format!("{:.1}", next));
                }
                if let Some(current) = state.values.get("battery").and_then(|v| v.parse::<i64>().ok()) {
                    let next = (current - rng.gen_range(0..2)).max(0);
                    state.values.insert("battery".into(), next.to_string());
                }
            }
            "thermostat" => {
                let current = state.values.get("temperature").and_then(|v| v.parse::<f64>().ok());
                let target = state
                    .values
                    .get("target_temperature")
                    .and_then(|v| v.parse::<f64>().ok());
                if let (Some(current), Some(target)) = (current, target) {
                    let adjustment = (target - current) * 0.1 + (rng.gen::<f64>() - 0.5) * 0.2;
                    state
                        .values
                        .insert("temperature".into(), format!("{:.1}", current + adjustment));
                }
            }
            _ => {}
        }

        state.last_update = Instant::now();
    }
}

#[async_trait]
impl ProtocolAdapter for VirtualDeviceAdapter {
    fn name(&self) -> &'static str {
        "virtual"
    }

    async fn send_command(
        &self,
        device: &Device,
        command: &str,
        parameters: &HashMap<String, String>,
    ) -> AdapterResult<bool> {
        debug!(
            "command {} for virtual device {} with parameters {:?}",
            command, device.name, parameters
        );

        let mut state = self
            .states
            .entry(device.id.to_string())
            .or_insert_with(|| VirtualState::new(HashMap::new()));

        match command {
            "setState" => {
                // Bulk merge of every parameter into the device state.
                state
                    .values
                    .extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            "power" => {
                if let Some(value) = parameters.get("state") {
                    state.values.insert("power".into(), value.clone());
                }
            }
            "brightness" => {
                if let Some(value) = parameters.get("level") {
                    state.values.insert("brightness".into(), value.clone());
                }
            }
            "color" => {
                if let Some(value) = parameters.get("rgb") {
                    state.values.insert("color".into(), value.clone());
                }
            }
            "temperature" => {
                if let Some(value) = parameters.get("value") {
                    state.values.insert("temperature".into(), value.clone());
                }
            }
            _ => warn!("unknown command {} for device {}", command, device.name),
        }

        state.last_update = Instant::now();
        drop(state);

        // The failure roll happens after the state change: a rejected command
        // may still have been partially applied.
        Ok(rand::thread_rng().gen::<f64>() >= self.config.command_failure_rate)
    }

    async fn check_liveness(&self, device: &Device) -> AdapterResult<bool> {
        let id = device.id.to_string();
        if !self.states.contains_key(&id) {
            self.states
                .insert(id, VirtualState::new(Self::seed_values(device)));
            return Ok(true);
        }

        Ok(rand::thread_rng().gen::<f64>() >= self.config.outage_rate)
    }

    async fn fetch_properties(&self, device: &Device) -> AdapterResult<HashMap<String, String>> {
        let mut state = self
            .states
            .entry(device.id.to_string())
            .or_insert_with(|| VirtualState::new(Self::seed_values(device)));

        self.apply_drift(device, &mut state);
        Ok(state.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::ConnectionProtocol;

    fn deterministic_adapter() -> VirtualDeviceAdapter {
        VirtualDeviceAdapter::with_config(VirtualAdapterConfig {
            command_failure_rate: 0.0,
            outage_rate: 0.0,
            quiet_interval: Duration::ZERO,
        })
    }

    fn device(device_type: &str) -> Device {
        Device::new("test", device_type, ConnectionProtocol::Virtual)
    }

    #[tokio::test]
    async fn set_state_merges_all_parameters() {
        let adapter = deterministic_adapter();
        let device = device("light");

        let mut parameters = HashMap::new();
        parameters.insert("power".to_string(), "on".to_string());
        parameters.insert("brightness".to_string(), "70".to_string());

        assert!(adapter.send_command(&device, "setState", &parameters).await.unwrap());

        let properties = adapter.fetch_properties(&device).await.unwrap();
        assert_eq!(properties.get("power").map(String::as_str), Some("on"));
        assert_eq!(properties.get("brightness").map(String::as_str), Some("70"));
    }

    #[tokio::test]
    async fn single_field_commands_use_their_parameter_names() {
        let adapter = deterministic_adapter();
        let device = device("light");

        let mut parameters = HashMap::new();
        parameters.insert("state".to_string(), "on".to_string());
        adapter.send_command(&device, "power", &parameters).await.unwrap();

        let mut parameters = HashMap::new();
        parameters.insert("rgb".to_string(), "FF8800".to_string());
        adapter.send_command(&device, "color", &parameters).await.unwrap();

        let properties = adapter.fetch_properties(&device).await.unwrap();
        assert_eq!(properties.get("power").map(String::as_str), Some("on"));
        assert_eq!(properties.get("color").map(String::as_str), Some("FF8800"));
    }

    #[tokio::test]
    async fn unknown_commands_are_ignored() {
        let adapter = deterministic_adapter();
        let device = device("light");

        assert!(adapter
            .send_command(&device, "frobnicate", &HashMap::new())
            .await
            .unwrap());
        let properties = adapter.fetch_properties(&device).await.unwrap();
        assert!(!properties.contains_key("frobnicate"));
    }

    #[tokio::test]
    async fn seeds_type_appropriate_defaults() {
        let adapter = deterministic_adapter();

        let light = adapter.fetch_properties(&device("light")).await.unwrap();
        assert_eq!(light.get("power").map(String::as_str), Some("off"));
        assert!(light.contains_key("brightness"));
        assert!(light.contains_key("color"));

        let thermostat = adapter.fetch_properties(&device("thermostat")).await.unwrap();
        assert!(thermostat.contains_key("temperature"));
        assert!(thermostat.contains_key("target_temperature"));

        let sensor = adapter.fetch_properties(&device("sensor")).await.unwrap();
        assert!(sensor.contains_key("temperature"));
        assert!(sensor.contains_key("humidity"));
        assert!(sensor.contains_key("battery"));

        let unknown = adapter.fetch_properties(&device("toaster")).await.unwrap();
        assert_eq!(unknown.get("status").map(String::as_str), Some("unknown"));
    }

    #[tokio::test]
    async fn humidity_stays_clamped() {
        let adapter = deterministic_adapter();
        let device = device("sensor");

        adapter.fetch_properties(&device).await.unwrap();
        // Drive the walk hard against both bounds.
        for _ in 0..500 {
            let properties = adapter.fetch_properties(&device).await.unwrap();
            let humidity: f64 = properties.get("humidity").unwrap().parse().unwrap();
            assert!((0.0..=100.0).contains(&humidity), "humidity {} out of range", humidity);
        }
    }

    #[tokio::test]
    async fn battery_never_increases() {
        let adapter = deterministic_adapter();
        let device = device("sensor");

        let mut previous: i64 = adapter
            .fetch_properties(&device)
            .await
            .unwrap()
            .get("battery")
            .unwrap()
            .parse()
            .unwrap();

        for _ in 0..100 {
            let current: i64 = adapter
                .fetch_properties(&device)
                .await
                .unwrap()
                .get("battery")
                .unwrap()
                .parse()
                .unwrap();
            assert!(current <= previous);
            assert!(current >= 0);
            previous = current;
        }
    }

    #[tokio::test]
    async fn thermostat_approaches_target() {
        let adapter = deterministic_adapter();
        let device = device("thermostat");

        let mut parameters = HashMap::new();
        parameters.insert("value".to_string(), "10.0".to_string());
        adapter.send_command(&device, "temperature", &parameters).await.unwrap();

        // Target stays at the seeded 22.0; the reading climbs towards it.
        for _ in 0..200 {
            adapter.fetch_properties(&device).await.unwrap();
        }
        let properties = adapter.fetch_properties(&device).await.unwrap();
        let temperature: f64 = properties.get("temperature").unwrap().parse().unwrap();
        assert!(temperature > 15.0, "temperature {} did not approach target", temperature);
    }

    #[tokio::test]
    async fn quiet_interval_bounds_recomputation() {
        let adapter = VirtualDeviceAdapter::with_config(VirtualAdapterConfig {
            command_failure_rate: 0.0,
            outage_rate: 0.0,
            quiet_interval: Duration::from_secs(3600),
        });
        let device = device("sensor");

        let first = adapter.fetch_properties(&device).await.unwrap();
        let second = adapter.fetch_properties(&device).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn first_liveness_check_seeds_and_reports_online() {
        let adapter = deterministic_adapter();
        let device = device("sensor");

        assert!(adapter.check_liveness(&device).await.unwrap());
        let properties = adapter.fetch_properties(&device).await.unwrap();
        assert!(properties.contains_key("temperature"));
    }

    #[tokio::test]
    async fn failure_rate_of_one_always_rejects() {
        let adapter = VirtualDeviceAdapter::with_config(VirtualAdapterConfig {
            command_failure_rate: 1.0,
            outage_rate: 1.0,
            quiet_interval: Duration::ZERO,
        });
        let device = device("light");

        let mut parameters = HashMap::new();
        parameters.insert("power".to_string(), "on".to_string());
        assert!(!adapter.send_command(&device, "setState", &parameters).await.unwrap());

        // The rejected command was still applied; callers must not assume
        // "false" means "state unchanged".
        let properties = adapter.fetch_properties(&device).await.unwrap();
        assert_eq!(properties.get("power").map(String::as_str), Some("on"));

        assert!(!adapter.check_liveness(&device).await.unwrap());
    }
}
