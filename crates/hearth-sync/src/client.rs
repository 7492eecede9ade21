//! ThingsBoard-compatible remote platform client.
//!
//! Owns the platform session (a JWT obtained from the login endpoint and
//! kept until invalidated), device provisioning and the scoped attribute and
//! telemetry wire calls. Two routes exist and must not be mixed: the public
//! device API under `/api/v1/{token}/...` is keyed by the per-device access
//! credential and needs no session; the tenant API under `/api/...` requires
//! the session header. A session-gated call answered with 401/403 triggers
//! exactly one re-login and retry before the auth failure surfaces.

use std::collections::HashMap;

use reqwest::{Method, Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use async_trait::async_trait;
use hearth_core::{AttributeScope, Device, TELEMETRY_PREFIX};

use crate::config::ThingsBoardConfig;
use crate::error::SyncError;
use crate::remote::{RemoteDeviceInfo, RemotePlatform, ScopedAttributes};
use crate::telemetry::TelemetryValue;

const SESSION_HEADER: &str = "X-Authorization";

/// Client for the remote IoT platform.
pub struct ThingsBoardClient {
    http: reqwest::Client,
    config: ThingsBoardConfig,
    /// Cached session JWT; `None` means "log in before the next tenant call".
    session: RwLock<Option<String>>,
}

impl ThingsBoardClient {
    pub fn new(config: ThingsBoardConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Authenticate against the platform and cache the session token.
    pub async fn login(&self) -> Result<(), SyncError> {
        let response = self
            .http
            .post(self.url("/api/auth/login"))
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SyncError::Auth {
                status: response.status(),
            });
        }

        let body: Value = response.json().await?;
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::UnexpectedShape("login response lacks a token".into()))?;

        *self.session.write().await = Some(token.to_string());
        debug!("authenticated against {}", self.config.base_url);
        Ok(())
    }

    /// Drop the cached session so the next tenant call logs in again.
    pub async fn invalidate_session(&self) {
        *self.session.write().await = None;
    }

    async fn ensure_session(&self) -> Result<String, SyncError> {
        if let Some(token) = self.session.read().await.clone() {
            return Ok(token);
        }
        self.login().await?;
        self.session
            .read()
            .await
            .clone()
            .ok_or(SyncError::Auth {
                status: StatusCode::UNAUTHORIZED,
            })
    }

    /// Send a session-keyed request, re-authenticating once on 401/403.
    async fn session_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, SyncError> {
        let jwt = self.ensure_session().await?;
        let response = self.send_with_session(method.clone(), path, body, &jwt).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("session rejected (status {}), re-authenticating", status);
            self.invalidate_session().await;
            let jwt = self.ensure_session().await?;
            return self.send_with_session(method, path, body, &jwt).await.map_err(Into::into);
        }

        Ok(response)
    }

    async fn send_with_session(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        jwt: &str,
    ) -> Result<Response, reqwest::Error> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .header(SESSION_HEADER, format!("Bearer {jwt}"));
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    fn check(operation: &'static str, response: &Response) -> Result<(), SyncError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::Status { operation, status })
        }
    }

    fn require_token(device: &Device) -> Result<&str, SyncError> {
        device
            .thingsboard_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::MissingCredential {
                device: device.name.clone(),
            })
    }

    async fn require_remote_id(&self, device: &Device) -> Result<String, SyncError> {
        if let Some(id) = device
            .thingsboard_device_id
            .as_deref()
            .filter(|i| !i.is_empty())
        {
            return Ok(id.to_string());
        }
        let token = Self::require_token(device)?;
        self.resolve_device_id(token).await
    }

    fn metadata_body(device: &Device) -> Value {
        json!({
            "name": device.name,
            "type": device.device_type,
            "additionalInfo": {
                "description": format!("Device managed by Hearth: {}", device.name),
                "manufacturer": device.manufacturer,
                "model": device.model,
                "firmwareVersion": device.firmware_version,
            },
        })
    }

    /// Create the device on the remote platform, then resolve and store its
    /// access credential. The remote identity arrives as a nested
    /// `{id: {id: <uuid>}}` object; its absence is a hard failure.
    pub async fn provision(&self, device: &mut Device) -> Result<(), SyncError> {
        info!("creating device {} on the remote platform", device.name);

        let response = self
            .session_request(Method::POST, "/api/device", Some(&Self::metadata_body(device)))
            .await?;
        Self::check("device create", &response)?;

        let body: Value = response.json().await?;
        let remote_id = extract_entity_id(&body, "id").ok_or_else(|| {
            SyncError::UnexpectedShape("device create response lacks a nested id".into())
        })?;
        device.thingsboard_device_id = Some(remote_id.clone());

        let token = self.device_credentials(&remote_id).await?;
        info!(
            "device {} created remotely with id {} and an access credential",
            device.name, remote_id
        );
        device.thingsboard_token = Some(token);
        Ok(())
    }

    /// Push the device's metadata, then its namespaced attributes and
    /// telemetry, as one combined update.
    pub async fn update_device(&self, device: &mut Device) -> Result<(), SyncError> {
        Self::require_token(device)?;
        let remote_id = self.require_remote_id(device).await?;
        if device.thingsboard_device_id.as_deref() != Some(remote_id.as_str()) {
            device.thingsboard_device_id = Some(remote_id.clone());
        }

        let mut body = Self::metadata_body(device);
        body["id"] = Value::String(remote_id.clone());
        let response = self
            .session_request(Method::POST, &format!("/api/device/{remote_id}"), Some(&body))
            .await?;
        Self::check("device update", &response)?;
        debug!("device {} metadata updated remotely", device.name);

        if let Err(err) = self.push_namespaced_attributes(device).await {
            warn!("attribute push for device {} failed: {}", device.name, err);
        }
        if let Err(err) = self
            .push_telemetry(device, device.telemetry_values())
            .await
        {
            warn!("telemetry push for device {} failed: {}", device.name, err);
        }
        Ok(())
    }

    /// Push every namespaced attribute of the device into its scope.
    pub async fn push_namespaced_attributes(&self, device: &Device) -> Result<(), SyncError> {
        for scope in [
            AttributeScope::Client,
            AttributeScope::Shared,
            AttributeScope::Server,
        ] {
            let values = device.scoped_attributes(scope);
            if values.is_empty() {
                continue;
            }
            self.push_attributes(device, scope, values).await?;
        }
        Ok(())
    }

    async fn direct_id_lookup(&self, token: &str) -> Result<Option<String>, SyncError> {
        let path = format!(
            "/api/device/credentials?credentialsType=ACCESS_TOKEN&credentialsId={}",
            urlencoding::encode(token)
        );
        let response = self.session_request(Method::GET, &path, None).await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body: Value = response.json().await?;
        Ok(extract_entity_id(&body, "deviceId"))
    }

    /// Degraded identity lookup: walk the full remote device list and query
    /// each device's credentials until the token matches. O(n) in the total
    /// remote device count; last resort only.
    async fn scan_devices_for_token(&self, token: &str) -> Result<String, SyncError> {
        warn!("falling back to a full device scan to resolve an access credential");
        for info in self.list_devices().await? {
            match self.device_credentials(&info.id).await {
                Ok(candidate) if candidate == token => {
                    info!("credential resolved to device {} via the fallback scan", info.id);
                    return Ok(info.id);
                }
                Ok(_) => {}
                Err(err) => debug!("credential lookup for {} failed: {}", info.id, err),
            }
        }
        Err(SyncError::IdentityResolution)
    }
}

/// Extract the inner uuid of a nested `{field: {id: <uuid>}}` identity
/// object, accepting a bare string as a fallback.
fn extract_entity_id(body: &Value, field: &str) -> Option<String> {
    let value = body.get(field)?;
    if let Some(nested) = value.get("id").and_then(Value::as_str) {
        return Some(nested.to_string());
    }
    value.as_str().map(str::to_string)
}

/// Coerce a cached string value into a typed JSON value for the scoped
/// attribute endpoints: booleans, integers and plain decimals keep their
/// types, everything else stays a string.
fn coerce_value(value: &str) -> Value {
    if value.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(number) = value.parse::<i64>() {
            return Value::from(number);
        }
    }
    if let Some((integral, fractional)) = value.split_once('.') {
        let plain_decimal = !integral.is_empty()
            && !fractional.is_empty()
            && integral.bytes().all(|b| b.is_ascii_digit())
            && fractional.bytes().all(|b| b.is_ascii_digit());
        if plain_decimal {
            if let Ok(number) = value.parse::<f64>() {
                return Value::from(number);
            }
        }
    }
    Value::String(value.to_string())
}

#[async_trait]
impl RemotePlatform for ThingsBoardClient {
    async fn fetch_attributes(&self, token: &str) -> Result<ScopedAttributes, SyncError> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/{token}/attributes")))
            .send()
            .await?;
        Self::check("attribute fetch", &response)?;

        let body: Value = response.json().await?;
        let mut attributes = ScopedAttributes::default();
        if let Some(client) = body.get("client").and_then(Value::as_object) {
            attributes.client = client.clone().into_iter().collect();
        }
        if let Some(shared) = body.get("shared").and_then(Value::as_object) {
            attributes.shared = shared.clone().into_iter().collect();
        }
        Ok(attributes)
    }

    async fn fetch_server_attributes(
        &self,
        device_id: &str,
    ) -> Result<HashMap<String, Value>, SyncError> {
        let path = format!("/api/plugins/telemetry/DEVICE/{device_id}/values/attributes/SERVER_SCOPE");
        let response = self.session_request(Method::GET, &path, None).await?;
        Self::check("server attribute fetch", &response)?;

        let body: Value = response.json().await?;
        let mut attributes = HashMap::new();
        if let Some(entries) = body.as_array() {
            for entry in entries {
                let key = entry.get("key").and_then(Value::as_str);
                let value = entry.get("value");
                if let (Some(key), Some(value)) = (key, value) {
                    attributes.insert(key.to_string(), value.clone());
                }
            }
        }
        Ok(attributes)
    }

    async fn resolve_device_id(&self, token: &str) -> Result<String, SyncError> {
        match self.direct_id_lookup(token).await {
            Ok(Some(id)) => {
                debug!("credential resolved to device {} via the credentials endpoint", id);
                return Ok(id);
            }
            Ok(None) => warn!("credentials endpoint did not yield a device identity"),
            Err(err) => warn!("credential lookup failed: {}", err),
        }
        self.scan_devices_for_token(token).await
    }

    async fn fetch_latest_telemetry(
        &self,
        device_id: &str,
    ) -> Result<HashMap<String, TelemetryValue>, SyncError> {
        let path = format!("/api/plugins/telemetry/DEVICE/{device_id}/values/timeseries");
        let response = self.session_request(Method::GET, &path, None).await?;
        Self::check("telemetry fetch", &response)?;
        Ok(response.json().await?)
    }

    async fn fetch_telemetry_key(
        &self,
        device_id: &str,
        key: &str,
    ) -> Result<Option<TelemetryValue>, SyncError> {
        let path = format!(
            "/api/plugins/telemetry/DEVICE/{device_id}/values/timeseries?keys={}",
            urlencoding::encode(key)
        );
        let response = self.session_request(Method::GET, &path, None).await?;
        Self::check("telemetry key fetch", &response)?;

        let mut body: HashMap<String, TelemetryValue> = response.json().await?;
        Ok(body.remove(key))
    }

    async fn push_attributes(
        &self,
        device: &Device,
        scope: AttributeScope,
        values: HashMap<String, String>,
    ) -> Result<(), SyncError> {
        if values.is_empty() {
            return Ok(());
        }

        match scope {
            AttributeScope::Client => {
                // Public endpoint, keyed by the device credential alone.
                let token = Self::require_token(device)?;
                let response = self
                    .http
                    .post(self.url(&format!("/api/v1/{token}/attributes")))
                    .json(&values)
                    .send()
                    .await?;
                Self::check("client attribute push", &response)?;
            }
            AttributeScope::Shared | AttributeScope::Server => {
                let remote_id = self.require_remote_id(device).await?;
                let scope_name = match scope {
                    AttributeScope::Shared => "SHARED_SCOPE",
                    _ => "SERVER_SCOPE",
                };
                let body: Value = values
                    .iter()
                    .map(|(k, v)| (k.clone(), coerce_value(v)))
                    .collect::<serde_json::Map<String, Value>>()
                    .into();
                let path =
                    format!("/api/plugins/telemetry/DEVICE/{remote_id}/attributes/{scope_name}");
                let response = self.session_request(Method::POST, &path, Some(&body)).await?;
                Self::check("scoped attribute push", &response)?;
            }
        }
        debug!(
            "pushed {} {} attributes for device {}",
            values.len(),
            scope,
            device.name
        );
        Ok(())
    }

    async fn push_telemetry(
        &self,
        device: &Device,
        values: HashMap<String, String>,
    ) -> Result<(), SyncError> {
        let token = Self::require_token(device)?;

        let mut payload: HashMap<String, String> = values
            .into_iter()
            .map(|(key, value)| {
                let wire_key = key
                    .strip_prefix(TELEMETRY_PREFIX)
                    .map(str::to_string)
                    .unwrap_or(key);
                (wire_key, value)
            })
            .collect();
        payload.insert("status".to_string(), device.status.to_string());

        let response = self
            .http
            .post(self.url(&format!("/api/v1/{token}/telemetry")))
            .json(&payload)
            .send()
            .await?;
        Self::check("telemetry push", &response)?;
        debug!("pushed telemetry for device {}", device.name);
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<RemoteDeviceInfo>, SyncError> {
        let response = self
            .session_request(Method::GET, "/api/tenant/devices?pageSize=100&page=0", None)
            .await?;
        Self::check("device list", &response)?;

        let body: Value = response.json().await?;
        let mut devices = Vec::new();
        if let Some(entries) = body.get("data").and_then(Value::as_array) {
            for entry in entries {
                let Some(id) = extract_entity_id(entry, "id") else {
                    warn!("skipping a listed device without a usable identity");
                    continue;
                };
                let info = entry.get("additionalInfo");
                let string_field = |source: Option<&Value>, key: &str| {
                    source
                        .and_then(|v| v.get(key))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                };
                devices.push(RemoteDeviceInfo {
                    id,
                    name: entry
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    device_type: entry
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    label: entry
                        .get("label")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    manufacturer: string_field(info, "manufacturer"),
                    model: string_field(info, "model"),
                    firmware_version: string_field(info, "firmwareVersion"),
                });
            }
        }
        debug!("listed {} remote devices", devices.len());
        Ok(devices)
    }

    async fn device_credentials(&self, device_id: &str) -> Result<String, SyncError> {
        let path = format!("/api/device/{device_id}/credentials");
        let response = self.session_request(Method::GET, &path, None).await?;
        Self::check("credential fetch", &response)?;

        let body: Value = response.json().await?;
        body.get("credentialsId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                SyncError::UnexpectedShape("credentials response lacks credentialsId".into())
            })
    }
}
