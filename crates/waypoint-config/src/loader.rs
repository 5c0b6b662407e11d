// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./waypoint.toml` > `~/.config/waypoint/waypoint.toml` > `/etc/waypoint/waypoint.toml`
//! with environment variable overrides via `WAYPOINT_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WaypointConfig;

/// Top-level sections, used to turn `WAYPOINT_LOADER_LOAD_TIMEOUT_SECS` into
/// `loader.load_timeout_secs`.
const SECTIONS: &[&str] = &["host", "backend", "loader", "sandbox"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/waypoint/waypoint.toml` (system-wide)
/// 3. `~/.config/waypoint/waypoint.toml` (user XDG config)
/// 4. `./waypoint.toml` (local directory)
/// 5. `WAYPOINT_*` environment variables
pub fn load_config() -> Result<WaypointConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<WaypointConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WaypointConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WaypointConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WaypointConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WaypointConfig::default()))
        .merge(Toml::file("/etc/waypoint/waypoint.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("waypoint/waypoint.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("waypoint.toml"))
        .merge(env_provider())
}

/// Environment provider mapping the first `_` after a known section to a dot.
///
/// `Env::split("_")` would also split inside key names such as
/// `request_timeout_secs`, so only the section boundary is mapped.
fn env_provider() -> Env {
    Env::prefixed("WAYPOINT_").map(|key| {
        let key_str = key.as_str();
        for section in SECTIONS {
            if let Some(rest) = key_str
                .strip_prefix(section)
                .and_then(|r| r.strip_prefix('_'))
            {
                return format!("{section}.{rest}").into();
            }
        }
        key_str.to_string().into()
    })
}
