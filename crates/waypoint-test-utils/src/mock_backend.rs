// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory plugin-management backend.
//!
//! `MockBackend` implements `PluginBackend` over plain collections, so
//! registry behavior can be exercised without an HTTP server. Every call is
//! recorded in a [`CallLog`] as `backend:<operation>[:<plugin id>]`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use waypoint_core::{
    DiscoveredPlugin, PluginBackend, PluginInfo, PluginInstallResponse, PluginSummary,
    SettingsUpdateResult, ToggleResult, UninstallResult, WaypointError,
};

use crate::call_log::CallLog;

#[derive(Default)]
struct State {
    plugins: Vec<PluginSummary>,
    discovered: Vec<DiscoveredPlugin>,
    packages: HashMap<String, PluginSummary>,
    settings: HashMap<String, serde_json::Value>,
    failing: BTreeSet<String>,
}

/// A mock backend holding installed and discovered plugins in memory.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<State>>,
    log: CallLog,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-loaded with installed plugins.
    pub fn with_plugins(plugins: Vec<PluginSummary>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                plugins,
                ..State::default()
            })),
            log: CallLog::new(),
        }
    }

    /// Record calls into `log` instead of a private log.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub async fn add_discovered(&self, plugin: DiscoveredPlugin) {
        self.state.lock().await.discovered.push(plugin);
    }

    /// Make `install_package(file_name, ..)` install `plugin`.
    pub async fn stage_package(&self, file_name: &str, plugin: PluginSummary) {
        self.state
            .lock()
            .await
            .packages
            .insert(file_name.to_string(), plugin);
    }

    /// Make every call to `operation` fail with a 500 until cleared.
    pub async fn fail_on(&self, operation: &str) {
        self.state.lock().await.failing.insert(operation.to_string());
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failing.clear();
    }

    pub async fn installed_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .plugins
            .iter()
            .map(|p| p.plugin_id.clone())
            .collect()
    }

    /// Record the call and fail if `operation` is marked as failing.
    fn enter(&self, state: &State, operation: &str, plugin_id: Option<&str>) -> Result<(), WaypointError> {
        match plugin_id {
            Some(id) => self.log.push(format!("backend:{operation}:{id}")),
            None => self.log.push(format!("backend:{operation}")),
        }
        if state.failing.contains(operation) {
            return Err(WaypointError::Backend {
                message: format!("{operation}: backend returned 500: simulated failure"),
                status: Some(500),
                source: None,
            });
        }
        Ok(())
    }
}

fn not_found(plugin_id: &str) -> WaypointError {
    WaypointError::Backend {
        message: format!("plugin '{plugin_id}' is not installed"),
        status: Some(404),
        source: None,
    }
}

fn installed_from(plugin: &DiscoveredPlugin) -> PluginSummary {
    let frontend = plugin
        .manifest
        .as_ref()
        .is_some_and(|m| m.capabilities.frontend);
    PluginSummary {
        plugin_id: plugin.plugin_id.clone(),
        plugin_version: plugin.plugin_version.clone(),
        manifest: plugin.manifest.clone(),
        has_frontend: frontend,
        has_backend: true,
        enabled: true,
        installed_at: Some(chrono::Utc::now()),
        updated_at: None,
    }
}

#[async_trait]
impl PluginBackend for MockBackend {
    async fn list_plugins(&self) -> Result<Vec<PluginSummary>, WaypointError> {
        let state = self.state.lock().await;
        self.enter(&state, "list", None)?;
        Ok(state.plugins.clone())
    }

    async fn list_discovered(&self) -> Result<Vec<DiscoveredPlugin>, WaypointError> {
        let state = self.state.lock().await;
        self.enter(&state, "discovered", None)?;
        Ok(state.discovered.clone())
    }

    async fn get_plugin(&self, plugin_id: &str) -> Result<PluginInfo, WaypointError> {
        let state = self.state.lock().await;
        self.enter(&state, "get", Some(plugin_id))?;
        let summary = state
            .plugins
            .iter()
            .find(|p| p.plugin_id == plugin_id)
            .cloned()
            .ok_or_else(|| not_found(plugin_id))?;
        Ok(PluginInfo {
            summary,
            settings: state
                .settings
                .get(plugin_id)
                .cloned()
                .unwrap_or_else(|| serde_json::json!({})),
            config_schema: None,
            migration_version: Some("0001".to_string()),
        })
    }

    async fn install_discovered(
        &self,
        plugin_id: &str,
    ) -> Result<PluginInstallResponse, WaypointError> {
        let mut state = self.state.lock().await;
        self.enter(&state, "install_discovered", Some(plugin_id))?;
        let position = state
            .discovered
            .iter()
            .position(|p| p.plugin_id == plugin_id)
            .ok_or_else(|| WaypointError::Backend {
                message: format!("plugin '{plugin_id}' was not discovered"),
                status: Some(404),
                source: None,
            })?;
        let discovered = state.discovered.remove(position);
        let installed = installed_from(&discovered);
        state.plugins.retain(|p| p.plugin_id != plugin_id);
        state.plugins.push(installed);
        Ok(PluginInstallResponse {
            success: true,
            plugin_id: plugin_id.to_string(),
            plugin_version: Some(discovered.plugin_version),
            message: Some("installed".to_string()),
        })
    }

    async fn install_package(
        &self,
        file_name: &str,
        _package: Vec<u8>,
    ) -> Result<PluginInstallResponse, WaypointError> {
        let mut state = self.state.lock().await;
        self.enter(&state, "install_package", Some(file_name))?;
        let plugin = state
            .packages
            .get(file_name)
            .cloned()
            .ok_or_else(|| WaypointError::Backend {
                message: format!("'{file_name}' is not a valid plugin package"),
                status: Some(400),
                source: None,
            })?;
        state.plugins.retain(|p| p.plugin_id != plugin.plugin_id);
        state.plugins.push(plugin.clone());
        Ok(PluginInstallResponse {
            success: true,
            plugin_id: plugin.plugin_id,
            plugin_version: Some(plugin.plugin_version),
            message: None,
        })
    }

    async fn uninstall(
        &self,
        plugin_id: &str,
        drop_tables: bool,
        remove_permissions: bool,
    ) -> Result<UninstallResult, WaypointError> {
        let mut state = self.state.lock().await;
        self.enter(&state, "uninstall", Some(plugin_id))?;
        let before = state.plugins.len();
        state.plugins.retain(|p| p.plugin_id != plugin_id);
        if state.plugins.len() == before {
            return Err(not_found(plugin_id));
        }
        state.settings.remove(plugin_id);
        Ok(UninstallResult {
            success: true,
            plugin_id: plugin_id.to_string(),
            tables_dropped: drop_tables,
            permissions_removed: remove_permissions,
            message: None,
        })
    }

    async fn enable(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError> {
        self.toggle(plugin_id, true).await
    }

    async fn disable(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError> {
        self.toggle(plugin_id, false).await
    }

    async fn update_settings(
        &self,
        plugin_id: &str,
        settings: serde_json::Value,
    ) -> Result<SettingsUpdateResult, WaypointError> {
        let mut state = self.state.lock().await;
        self.enter(&state, "settings", Some(plugin_id))?;
        if !state.plugins.iter().any(|p| p.plugin_id == plugin_id) {
            return Err(not_found(plugin_id));
        }
        state
            .settings
            .insert(plugin_id.to_string(), settings.clone());
        Ok(SettingsUpdateResult {
            success: true,
            settings,
            message: None,
        })
    }
}

impl MockBackend {
    async fn toggle(&self, plugin_id: &str, enabled: bool) -> Result<ToggleResult, WaypointError> {
        let operation = if enabled { "enable" } else { "disable" };
        let mut state = self.state.lock().await;
        self.enter(&state, operation, Some(plugin_id))?;
        let plugin = state
            .plugins
            .iter_mut()
            .find(|p| p.plugin_id == plugin_id)
            .ok_or_else(|| not_found(plugin_id))?;
        plugin.enabled = enabled;
        plugin.updated_at = Some(chrono::Utc::now());
        Ok(ToggleResult {
            success: true,
            plugin_id: plugin_id.to_string(),
            enabled,
            message: None,
        })
    }
}
