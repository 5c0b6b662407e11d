// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dynamic module import trait.

use async_trait::async_trait;

use crate::error::WaypointError;
use crate::exports::PluginExports;

/// Fetches and evaluates a plugin's frontend module.
///
/// Implementations must fail with [`WaypointError::Contract`] when the
/// evaluated module does not expose a manifest.
#[async_trait]
pub trait ModuleImporter: Send + Sync + 'static {
    /// Imports the module served at `url` on behalf of `plugin_id`.
    async fn import(&self, plugin_id: &str, url: &str) -> Result<PluginExports, WaypointError>;
}
