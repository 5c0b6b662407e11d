// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as URL schemes, non-zero timeouts and a parseable host version.

use crate::diagnostic::ConfigError;
use crate::model::WaypointConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &WaypointConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.host.name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "host.name must not be empty".to_string(),
        });
    }

    if semver::Version::parse(&config.host.version).is_err() {
        errors.push(ConfigError::Validation {
            message: format!(
                "host.version `{}` is not a valid semantic version",
                config.host.version
            ),
        });
    }

    if !LOG_LEVELS.contains(&config.host.log_level.to_lowercase().as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "host.log_level `{}` must be one of: {}",
                config.host.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    check_http_url(&mut errors, "backend.base_url", &config.backend.base_url);
    check_http_url(
        &mut errors,
        "loader.asset_base_url",
        &config.loader.asset_base_url,
    );

    if config.backend.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "backend.request_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.loader.load_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "loader.load_timeout_secs must be greater than 0".to_string(),
        });
    }

    let entry = config.loader.module_entry.trim();
    if entry.is_empty() || entry.starts_with('/') || entry.split('/').any(|seg| seg == "..") {
        errors.push(ConfigError::Validation {
            message: format!(
                "loader.module_entry `{}` must be a relative path inside the plugin's asset directory",
                config.loader.module_entry
            ),
        });
    }

    if config.sandbox.fuel == 0 {
        errors.push(ConfigError::Validation {
            message: "sandbox.fuel must be greater than 0".to_string(),
        });
    }

    if config.sandbox.epoch_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "sandbox.epoch_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.sandbox.max_module_bytes == 0 {
        errors.push(ConfigError::Validation {
            message: "sandbox.max_module_bytes must be greater than 0".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_url(errors: &mut Vec<ConfigError>, key: &str, value: &str) {
    let value = value.trim();
    let rest = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => {}
        _ => errors.push(ConfigError::Validation {
            message: format!("{key} `{value}` must be an absolute http:// or https:// URL"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&WaypointConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = WaypointConfig::default();
        config.backend.base_url = "ftp://plugins".into();
        config.loader.load_timeout_secs = 0;
        config.host.version = "one".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn rejects_module_entry_escaping_plugin_dir() {
        let mut config = WaypointConfig::default();
        config.loader.module_entry = "../other/plugin.wasm".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("loader.module_entry"));
    }

    #[test]
    fn rejects_url_without_host() {
        let mut config = WaypointConfig::default();
        config.loader.asset_base_url = "https://".into();
        assert!(validate_config(&config).is_err());
    }
}
