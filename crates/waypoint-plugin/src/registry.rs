// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin registry: the single owner of installed, discovered and loaded
//! plugin state.
//!
//! State is published through a `tokio::sync::watch` channel. Every mutation
//! goes through `send_modify`, so subscribers (the provider, projection
//! watchers, the CLI) observe each change.
//!
//! Mutating operations are user actions: their failures are returned to the
//! caller and also recorded in [`RegistryState::error`]. Batch operations
//! (discovery, frontend loading) log per-plugin failures and carry on.
//!
//! [`PluginRegistry::reset`] bumps [`RegistryState::generation`]. Loads that
//! started under an older generation finish without publishing.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use waypoint_core::{
    DiscoveredPlugin, NavItem, PluginBackend, PluginInfo, PluginInstallResponse, PluginSummary,
    RouteDef, SettingsUpdateResult, ToggleResult, UninstallResult, WaypointError, WidgetDef,
};

use crate::loader::{LoadedPlugin, PluginLoader};
use crate::manifest::check_dependencies;
use crate::projection;

/// Snapshot of everything the registry owns.
#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    pub plugins: Vec<PluginSummary>,
    pub discovered: Vec<DiscoveredPlugin>,
    /// Load results in load order, failures included.
    pub loaded: Vec<LoadedPlugin>,
    pub is_loading: bool,
    /// Set once the first `load_all_frontends` batch has completed.
    pub is_initialized: bool,
    /// Last user-facing error, for passive display.
    pub error: Option<String>,
    /// Incremented by every reset.
    pub generation: u64,
}

impl RegistryState {
    pub fn summary(&self, id: &str) -> Option<&PluginSummary> {
        self.plugins.iter().find(|p| p.plugin_id == id)
    }

    pub fn loaded_plugin(&self, id: &str) -> Option<&LoadedPlugin> {
        self.loaded.iter().find(|p| p.id == id)
    }
}

/// Backend results that carry their own `success` flag.
trait Outcome {
    fn failure(&self) -> Option<String>;
}

macro_rules! impl_outcome {
    ($($ty:ty),*) => {$(
        impl Outcome for $ty {
            fn failure(&self) -> Option<String> {
                (!self.success).then(|| {
                    self.message
                        .clone()
                        .unwrap_or_else(|| "backend reported failure".to_string())
                })
            }
        }
    )*};
}

impl_outcome!(PluginInstallResponse, UninstallResult, ToggleResult, SettingsUpdateResult);

/// Registry of installed plugins and their loaded frontends.
pub struct PluginRegistry {
    backend: Arc<dyn PluginBackend>,
    loader: Arc<PluginLoader>,
    state: watch::Sender<RegistryState>,
}

impl PluginRegistry {
    pub fn new(backend: Arc<dyn PluginBackend>, loader: Arc<PluginLoader>) -> Self {
        let (state, _) = watch::channel(RegistryState::default());
        Self {
            backend,
            loader,
            state,
        }
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    /// Receive every future state change.
    pub fn subscribe(&self) -> watch::Receiver<RegistryState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> RegistryState {
        self.state.borrow().clone()
    }

    fn record_error(&self, error: &WaypointError) {
        let message = error.to_string();
        self.state.send_modify(|s| s.error = Some(message));
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    /// Run a user-initiated backend mutation, recording any failure.
    async fn mutate<T: Outcome>(
        &self,
        action: &str,
        plugin_id: &str,
        call: impl Future<Output = Result<T, WaypointError>>,
    ) -> Result<T, WaypointError> {
        self.clear_error();
        let result = call.await.and_then(|outcome| match outcome.failure() {
            None => Ok(outcome),
            Some(message) => Err(WaypointError::backend(format!("{action} {plugin_id}: {message}"))),
        });
        if let Err(e) = &result {
            warn!(plugin_id, action, error = %e, "plugin operation failed");
            self.record_error(e);
        }
        result
    }

    /// Replace the installed list with the backend's.
    pub async fn fetch_plugins(&self) -> Result<Vec<PluginSummary>, WaypointError> {
        self.state.send_modify(|s| s.is_loading = true);
        match self.backend.list_plugins().await {
            Ok(plugins) => {
                debug!(count = plugins.len(), "fetched installed plugins");
                let snapshot = plugins.clone();
                self.state.send_modify(|s| {
                    s.plugins = plugins;
                    s.is_loading = false;
                });
                Ok(snapshot)
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch installed plugins");
                let message = e.to_string();
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(message);
                });
                Err(e)
            }
        }
    }

    /// Replace the discovered list; failures degrade to an empty list.
    pub async fn fetch_discovered_plugins(&self) -> Vec<DiscoveredPlugin> {
        let discovered = match self.backend.list_discovered().await {
            Ok(discovered) => discovered,
            Err(e) => {
                warn!(error = %e, "failed to fetch discovered plugins, continuing without");
                Vec::new()
            }
        };
        let snapshot = discovered.clone();
        self.state.send_modify(|s| s.discovered = discovered);
        snapshot
    }

    /// Load every enabled plugin that has a frontend.
    ///
    /// All plugins are attempted concurrently and every result, success or
    /// soft failure, lands in the loaded set. Plugins with unmet dependencies
    /// are recorded as failures without being imported.
    ///
    /// A batch overtaken by [`reset`](Self::reset) publishes nothing and
    /// returns an empty list.
    pub async fn load_all_frontends(&self) -> Vec<LoadedPlugin> {
        let mut installed = Vec::new();
        let mut generation = 0;
        self.state.send_modify(|s| {
            installed = s.plugins.clone();
            generation = s.generation;
            s.is_loading = true;
        });

        let loads = installed
            .iter()
            .filter(|p| p.enabled && p.has_frontend)
            .map(|summary| self.load_checked(summary, &installed));
        let loaded = join_all(loads).await;

        let failed = loaded.iter().filter(|p| !p.is_loaded).count();
        info!(
            loaded = loaded.len() - failed,
            failed, "plugin frontends loaded"
        );

        let snapshot = loaded.clone();
        let published = self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            s.loaded = loaded;
            s.is_loading = false;
            s.is_initialized = true;
            true
        });
        if !published {
            debug!(generation, "registry was reset during load, discarding batch");
            return Vec::new();
        }
        snapshot
    }

    async fn load_checked(&self, summary: &PluginSummary, installed: &[PluginSummary]) -> LoadedPlugin {
        let manifest = summary.manifest_or_placeholder();
        if let Err(e) = check_dependencies(&manifest, installed) {
            warn!(plugin_id = %summary.plugin_id, error = %e, "skipping plugin with unmet dependencies");
            return LoadedPlugin::failed(&summary.plugin_id, manifest, e);
        }
        self.loader.load_plugin(summary).await
    }

    /// Re-read the installed list after a successful mutation.
    ///
    /// A failed refresh is logged and the local update stands.
    async fn refresh_installed(&self, action: &str) {
        match self.backend.list_plugins().await {
            Ok(plugins) => self.state.send_modify(|s| s.plugins = plugins),
            Err(e) => warn!(action, error = %e, "refresh after plugin operation failed"),
        }
    }

    /// Refresh both lists after an install.
    async fn refresh_lists(&self) {
        tokio::join!(
            self.refresh_installed("install"),
            self.fetch_discovered_plugins()
        );
    }

    /// Install an uploaded plugin package.
    pub async fn install_plugin(
        &self,
        file_name: &str,
        package: Vec<u8>,
    ) -> Result<PluginInstallResponse, WaypointError> {
        let response = self
            .mutate(
                "install",
                file_name,
                self.backend.install_package(file_name, package),
            )
            .await?;
        info!(plugin_id = %response.plugin_id, "plugin installed from package");
        self.refresh_lists().await;
        Ok(response)
    }

    /// Install a plugin the backend discovered on disk.
    pub async fn install_discovered_plugin(
        &self,
        plugin_id: &str,
    ) -> Result<PluginInstallResponse, WaypointError> {
        let response = self
            .mutate(
                "install",
                plugin_id,
                self.backend.install_discovered(plugin_id),
            )
            .await?;
        info!(plugin_id, "discovered plugin installed");
        self.refresh_lists().await;
        Ok(response)
    }

    /// Unload, then remove the plugin from the backend.
    pub async fn uninstall_plugin(
        &self,
        plugin_id: &str,
        drop_tables: bool,
        remove_permissions: bool,
    ) -> Result<UninstallResult, WaypointError> {
        self.loader.unload_plugin(plugin_id).await;

        let result = self
            .mutate(
                "uninstall",
                plugin_id,
                self.backend
                    .uninstall(plugin_id, drop_tables, remove_permissions),
            )
            .await;
        self.state
            .send_modify(|s| s.loaded.retain(|p| p.id != plugin_id));
        let result = result?;

        self.state
            .send_modify(|s| s.plugins.retain(|p| p.plugin_id != plugin_id));
        info!(
            plugin_id,
            tables_dropped = result.tables_dropped,
            permissions_removed = result.permissions_removed,
            "plugin uninstalled"
        );
        self.refresh_installed("uninstall").await;
        Ok(result)
    }

    /// Enable on the backend, then load the frontend if there is one.
    pub async fn enable_plugin(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError> {
        let result = self
            .mutate("enable", plugin_id, self.backend.enable(plugin_id))
            .await?;

        self.state.send_modify(|s| {
            if let Some(p) = s.plugins.iter_mut().find(|p| p.plugin_id == plugin_id) {
                p.enabled = true;
            }
        });
        self.refresh_installed("enable").await;

        let (summary, installed, generation) = {
            let state = self.state.borrow();
            (
                state.summary(plugin_id).cloned(),
                state.plugins.clone(),
                state.generation,
            )
        };
        if let Some(summary) = summary.filter(|s| s.has_frontend) {
            let loaded = self.load_checked(&summary, &installed).await;
            let published = self.state.send_if_modified(|s| {
                if s.generation != generation {
                    return false;
                }
                upsert_loaded(&mut s.loaded, loaded);
                true
            });
            if !published {
                debug!(plugin_id, "registry was reset during load, discarding result");
            }
        }
        info!(plugin_id, "plugin enabled");
        Ok(result)
    }

    /// Unload, then disable on the backend.
    pub async fn disable_plugin(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError> {
        self.loader.unload_plugin(plugin_id).await;

        let result = self
            .mutate("disable", plugin_id, self.backend.disable(plugin_id))
            .await;
        self.state
            .send_modify(|s| s.loaded.retain(|p| p.id != plugin_id));
        let result = result?;

        self.state.send_modify(|s| {
            if let Some(p) = s.plugins.iter_mut().find(|p| p.plugin_id == plugin_id) {
                p.enabled = false;
            }
        });
        self.refresh_installed("disable").await;
        info!(plugin_id, "plugin disabled");
        Ok(result)
    }

    /// Replace a plugin's settings on the backend.
    pub async fn update_settings(
        &self,
        plugin_id: &str,
        settings: serde_json::Value,
    ) -> Result<SettingsUpdateResult, WaypointError> {
        self.mutate(
            "update settings",
            plugin_id,
            self.backend.update_settings(plugin_id, settings),
        )
        .await
    }

    /// Full backend detail for one installed plugin.
    pub async fn get_plugin_info(&self, plugin_id: &str) -> Result<PluginInfo, WaypointError> {
        self.backend.get_plugin(plugin_id).await
    }

    pub fn get_nav_items(&self) -> Vec<NavItem> {
        projection::project_nav_items(&self.loaded_snapshot())
    }

    pub fn get_routes(&self) -> Vec<RouteDef> {
        projection::project_routes(&self.loaded_snapshot())
    }

    pub fn get_widgets(&self) -> BTreeMap<String, Vec<WidgetDef>> {
        projection::project_widgets(&self.loaded_snapshot())
    }

    /// `(plugin id, error)` for every plugin whose load failed.
    pub fn load_errors(&self) -> Vec<(String, String)> {
        self.state
            .borrow()
            .loaded
            .iter()
            .filter(|p| !p.is_loaded)
            .map(|p| {
                (
                    p.id.clone(),
                    p.load_error.clone().unwrap_or_else(|| "unknown error".to_string()),
                )
            })
            .collect()
    }

    /// Unload everything and return to the initial empty state.
    pub async fn reset(&self) {
        self.loader.unload_all().await;
        self.state.send_modify(|s| {
            *s = RegistryState {
                generation: s.generation + 1,
                ..RegistryState::default()
            }
        });
        info!("plugin registry reset");
    }

    /// Plugin callbacks run outside the watch borrow.
    fn loaded_snapshot(&self) -> Vec<LoadedPlugin> {
        self.state.borrow().loaded.clone()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("PluginRegistry")
            .field("plugins", &state.plugins.len())
            .field("discovered", &state.discovered.len())
            .field("loaded", &state.loaded.len())
            .field("is_initialized", &state.is_initialized)
            .finish()
    }
}

fn upsert_loaded(loaded: &mut Vec<LoadedPlugin>, plugin: LoadedPlugin) {
    match loaded.iter_mut().find(|p| p.id == plugin.id) {
        Some(slot) => *slot = plugin,
        None => loaded.push(plugin),
    }
}
