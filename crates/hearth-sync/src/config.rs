//! Synchronization configuration.
//!
//! Settings come from the environment with sensible defaults, so a process
//! can run against a local remote platform with no configuration at all.

use std::time::Duration;

/// Environment variable names.
pub mod env_vars {
    pub const TB_URL: &str = "HEARTH_TB_URL";
    pub const TB_USERNAME: &str = "HEARTH_TB_USERNAME";
    pub const TB_PASSWORD: &str = "HEARTH_TB_PASSWORD";
    pub const TB_TIMEOUT_SECS: &str = "HEARTH_TB_TIMEOUT_SECS";

    pub const PUSH_INTERVAL_SECS: &str = "HEARTH_SYNC_PUSH_INTERVAL_SECS";
    pub const ATTRIBUTE_PULL_INTERVAL_SECS: &str = "HEARTH_SYNC_ATTRIBUTE_INTERVAL_SECS";
    pub const TELEMETRY_PULL_INTERVAL_SECS: &str = "HEARTH_SYNC_TELEMETRY_INTERVAL_SECS";
    pub const MAX_CONCURRENCY: &str = "HEARTH_SYNC_MAX_CONCURRENCY";
    pub const TELEMETRY_PROBE_KEYS: &str = "HEARTH_SYNC_TELEMETRY_PROBE_KEYS";
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Connection settings for the remote platform.
#[derive(Debug, Clone)]
pub struct ThingsBoardConfig {
    /// Base URL, without a trailing slash
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ThingsBoardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            username: "tenant@thingsboard.org".to_string(),
            password: "tenant".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ThingsBoardConfig {
    /// Load from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var(env_vars::TB_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            username: std::env::var(env_vars::TB_USERNAME).unwrap_or(defaults.username),
            password: std::env::var(env_vars::TB_PASSWORD).unwrap_or(defaults.password),
            request_timeout: Duration::from_secs(env_u64(env_vars::TB_TIMEOUT_SECS, 10)),
        }
    }

    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

/// Cadences and batch limits for the scheduled passes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Outward telemetry push sweep (default: 5 minutes)
    pub push_interval: Duration,
    /// Attribute pull pass (default: 1 hour)
    pub attribute_pull_interval: Duration,
    /// Telemetry pull pass (default: 5 minutes)
    pub telemetry_pull_interval: Duration,
    /// Bounded fan-out per pass; the remote platform is a shared resource
    pub max_concurrency: usize,
    /// Keys probed individually when a bulk telemetry fetch comes back empty
    pub probe_keys: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(300),
            attribute_pull_interval: Duration::from_secs(3600),
            telemetry_pull_interval: Duration::from_secs(300),
            max_concurrency: 4,
            probe_keys: ["status", "temperature", "humidity", "power", "brightness", "color"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SyncConfig {
    /// Load from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let probe_keys = std::env::var(env_vars::TELEMETRY_PROBE_KEYS)
            .map(|keys| {
                keys.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.probe_keys);

        Self {
            push_interval: Duration::from_secs(env_u64(env_vars::PUSH_INTERVAL_SECS, 300)),
            attribute_pull_interval: Duration::from_secs(env_u64(
                env_vars::ATTRIBUTE_PULL_INTERVAL_SECS,
                3600,
            )),
            telemetry_pull_interval: Duration::from_secs(env_u64(
                env_vars::TELEMETRY_PULL_INTERVAL_SECS,
                300,
            )),
            max_concurrency: env_u64(env_vars::MAX_CONCURRENCY, 4) as usize,
            probe_keys,
        }
    }
}
