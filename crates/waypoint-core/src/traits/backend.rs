// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin-management backend trait.

use async_trait::async_trait;

use crate::error::WaypointError;
use crate::types::{
    DiscoveredPlugin, PluginInfo, PluginInstallResponse, PluginSummary, SettingsUpdateResult,
    ToggleResult, UninstallResult,
};

/// The server side of plugin management: storage, installation, enablement.
///
/// The runtime never touches plugin storage directly; every state change
/// goes through this contract.
#[async_trait]
pub trait PluginBackend: Send + Sync + 'static {
    /// Lists every installed plugin.
    async fn list_plugins(&self) -> Result<Vec<PluginSummary>, WaypointError>;

    /// Lists plugins present in storage but not installed.
    async fn list_discovered(&self) -> Result<Vec<DiscoveredPlugin>, WaypointError>;

    /// Fetches detail (settings, config schema, migration version) for one plugin.
    async fn get_plugin(&self, plugin_id: &str) -> Result<PluginInfo, WaypointError>;

    /// Installs a previously discovered plugin.
    async fn install_discovered(
        &self,
        plugin_id: &str,
    ) -> Result<PluginInstallResponse, WaypointError>;

    /// Uploads and installs a zip package.
    async fn install_package(
        &self,
        file_name: &str,
        package: Vec<u8>,
    ) -> Result<PluginInstallResponse, WaypointError>;

    /// Removes an installed plugin.
    async fn uninstall(
        &self,
        plugin_id: &str,
        drop_tables: bool,
        remove_permissions: bool,
    ) -> Result<UninstallResult, WaypointError>;

    async fn enable(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError>;

    async fn disable(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError>;

    /// Replaces a plugin's settings object.
    async fn update_settings(
        &self,
        plugin_id: &str,
        settings: serde_json::Value,
    ) -> Result<SettingsUpdateResult, WaypointError>;
}
