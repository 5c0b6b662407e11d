// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Waypoint plugin runtime.

use thiserror::Error;

use crate::types::LifecycleHookKind;

/// The primary error type used across the plugin runtime.
#[derive(Debug, Error)]
pub enum WaypointError {
    /// Configuration errors (invalid TOML, bad URLs, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The plugin-management backend rejected a request or could not be reached.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        /// HTTP status returned by the backend, if a response was received.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A plugin module could not be fetched, compiled, or instantiated.
    #[error("module error for plugin '{plugin_id}': {message}")]
    Module { plugin_id: String, message: String },

    /// A loaded module does not satisfy the export contract.
    #[error("contract violation by plugin '{plugin_id}': {message}")]
    Contract { plugin_id: String, message: String },

    /// A lifecycle hook or contribution callback failed.
    #[error("{hook} failed for plugin '{plugin_id}': {message}")]
    Hook {
        plugin_id: String,
        hook: LifecycleHookKind,
        message: String,
    },

    /// The plugin cannot run against this host (version or dependencies).
    #[error("plugin '{plugin_id}' is incompatible: {message}")]
    Incompatible { plugin_id: String, message: String },

    /// No installed plugin with this id.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WaypointError {
    /// Shorthand for a backend error without a status or source.
    pub fn backend(message: impl Into<String>) -> Self {
        WaypointError::Backend {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// The plugin this error is attributed to, if any.
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            WaypointError::Module { plugin_id, .. }
            | WaypointError::Contract { plugin_id, .. }
            | WaypointError::Hook { plugin_id, .. }
            | WaypointError::Incompatible { plugin_id, .. } => Some(plugin_id),
            WaypointError::PluginNotFound(id) => Some(id),
            _ => None,
        }
    }
}
