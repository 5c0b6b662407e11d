// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Waypoint plugin runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Waypoint configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WaypointConfig {
    /// Identity of the host application.
    #[serde(default)]
    pub host: HostConfig,

    /// Plugin-management backend connection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Frontend module loading.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// WASM module sandbox limits.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl WaypointConfig {
    /// Renders the effective configuration as TOML, with the auth token redacted.
    pub fn to_redacted_toml(&self) -> Result<String, toml::ser::Error> {
        let mut shown = self.clone();
        if shown.backend.auth_token.is_some() {
            shown.backend.auth_token = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&shown)
    }
}

/// Host application identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Display name used in logs.
    #[serde(default = "default_host_name")]
    pub name: String,

    /// Host version that plugin `minHostVersion` requirements are checked against.
    #[serde(default = "default_host_version")]
    pub version: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            version: default_host_version(),
            log_level: default_log_level(),
        }
    }
}

fn default_host_name() -> String {
    "waypoint".to_string()
}

fn default_host_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Plugin-management backend connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL the `/plugins` endpoints are resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bearer token attached to every request. `None` sends no auth header.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            auth_token: None,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Frontend module loading settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// Root of the per-plugin static asset namespace.
    #[serde(default = "default_asset_base_url")]
    pub asset_base_url: String,

    /// Module path inside a plugin's asset namespace.
    #[serde(default = "default_module_entry")]
    pub module_entry: String,

    /// Upper bound for one import plus its `onLoad` hook.
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
}

impl LoaderConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            asset_base_url: default_asset_base_url(),
            module_entry: default_module_entry(),
            load_timeout_secs: default_load_timeout_secs(),
        }
    }
}

fn default_asset_base_url() -> String {
    "http://127.0.0.1:8000/static/plugins".to_string()
}

fn default_module_entry() -> String {
    "frontend/plugin.wasm".to_string()
}

fn default_load_timeout_secs() -> u64 {
    30
}

/// WASM sandbox resource limits, applied per guest call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Fuel budget for a single export call.
    #[serde(default = "default_fuel")]
    pub fuel: u64,

    /// Wall-clock limit for a single lifecycle hook.
    #[serde(default = "default_epoch_timeout_secs")]
    pub epoch_timeout_secs: u64,

    /// Largest module the host will compile.
    #[serde(default = "default_max_module_bytes")]
    pub max_module_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            fuel: default_fuel(),
            epoch_timeout_secs: default_epoch_timeout_secs(),
            max_module_bytes: default_max_module_bytes(),
        }
    }
}

fn default_fuel() -> u64 {
    1_000_000_000
}

fn default_epoch_timeout_secs() -> u64 {
    5
}

fn default_max_module_bytes() -> usize {
    16 * 1024 * 1024
}
