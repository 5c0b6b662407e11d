// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin frontend loader.
//!
//! [`PluginLoader`] turns a [`PluginSummary`] into a [`LoadedPlugin`] by
//! importing the plugin's module and running its `onLoad` hook. Results are
//! cached per plugin id, and concurrent loads of the same id share a single
//! in-flight future, so a plugin is imported and initialized at most once per
//! loaded lifetime.
//!
//! Loading never fails from the caller's point of view: any error is captured
//! in [`LoadedPlugin::load_error`] with `is_loaded = false`. Failed loads are
//! not cached, so the next call retries.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use reqwest::Url;
use semver::Version;
use tracing::{debug, info, warn};
use waypoint_config::WaypointConfig;
use waypoint_core::{
    LifecycleHookKind, ModuleImporter, PluginExports, PluginManifest, PluginSummary,
    WaypointError,
};

use crate::manifest::{check_host_compatibility, validate_manifest};

/// Runtime record of one plugin's load attempt.
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub id: String,
    /// The module's own manifest on success, the backend-reported one otherwise.
    pub manifest: PluginManifest,
    pub exports: Option<PluginExports>,
    pub is_loaded: bool,
    pub load_error: Option<String>,
}

impl LoadedPlugin {
    pub fn loaded(id: &str, exports: PluginExports) -> Self {
        Self {
            id: id.to_string(),
            manifest: exports.manifest.clone(),
            exports: Some(exports),
            is_loaded: true,
            load_error: None,
        }
    }

    pub fn failed(id: &str, manifest: PluginManifest, error: impl fmt::Display) -> Self {
        Self {
            id: id.to_string(),
            manifest,
            exports: None,
            is_loaded: false,
            load_error: Some(error.to_string()),
        }
    }
}

/// Where modules live and what the host can run.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub asset_base_url: String,
    pub module_entry: String,
    pub load_timeout: Duration,
    pub host_version: Version,
}

impl LoaderSettings {
    pub fn from_config(config: &WaypointConfig) -> Result<Self, WaypointError> {
        let host_version = Version::parse(&config.host.version).map_err(|e| {
            WaypointError::Config(format!(
                "host.version '{}' is not semver: {e}",
                config.host.version
            ))
        })?;
        Ok(Self {
            asset_base_url: config.loader.asset_base_url.clone(),
            module_entry: config.loader.module_entry.clone(),
            load_timeout: config.loader.load_timeout(),
            host_version,
        })
    }

    /// `{asset_base_url}/{plugin_id}/{module_entry}?v={plugin_version}`.
    ///
    /// The plugin id is always one percent-encoded path segment. The version
    /// query makes an upgraded plugin resolve to a new URL.
    pub fn module_url(&self, summary: &PluginSummary) -> Result<String, WaypointError> {
        let bad_base = || {
            WaypointError::Config(format!(
                "loader.asset_base_url '{}' cannot be used as a base",
                self.asset_base_url
            ))
        };
        let mut url = Url::parse(&self.asset_base_url).map_err(|_| bad_base())?;
        url.path_segments_mut()
            .map_err(|_| bad_base())?
            .pop_if_empty()
            .push(&summary.plugin_id)
            .extend(self.module_entry.trim_start_matches('/').split('/'));
        url.query_pairs_mut()
            .append_pair("v", &summary.plugin_version);
        Ok(url.into())
    }
}

type PendingLoad = Shared<BoxFuture<'static, LoadedPlugin>>;

#[derive(Default)]
struct LoaderState {
    cache: HashMap<String, LoadedPlugin>,
    /// In-flight loads, tagged with a ticket so a load that finishes after its
    /// plugin was unloaded does not repopulate the cache.
    in_flight: HashMap<String, (u64, PendingLoad)>,
    next_ticket: u64,
}

/// Loads, caches and unloads plugin frontends.
pub struct PluginLoader {
    importer: Arc<dyn ModuleImporter>,
    settings: Arc<LoaderSettings>,
    state: Arc<Mutex<LoaderState>>,
}

impl PluginLoader {
    pub fn new(importer: Arc<dyn ModuleImporter>, settings: LoaderSettings) -> Self {
        Self {
            importer,
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(LoaderState::default())),
        }
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve `summary` into a [`LoadedPlugin`]. Never fails; see module docs.
    pub async fn load_plugin(&self, summary: &PluginSummary) -> LoadedPlugin {
        let id = summary.plugin_id.as_str();
        let pending = {
            let mut state = self.state();
            if let Some(hit) = state.cache.get(id) {
                debug!(plugin_id = %id, "plugin already loaded");
                return hit.clone();
            }
            match state.in_flight.get(id) {
                Some((_, pending)) => {
                    debug!(plugin_id = %id, "joining in-flight load");
                    pending.clone()
                }
                None => {
                    let ticket = state.next_ticket;
                    state.next_ticket += 1;
                    let pending = self.start_load(summary.clone(), ticket);
                    state
                        .in_flight
                        .insert(id.to_string(), (ticket, pending.clone()));
                    pending
                }
            }
        };
        pending.await
    }

    /// Builds the shared future for one load. Its completion moves the result
    /// from the in-flight table into the cache.
    fn start_load(&self, summary: PluginSummary, ticket: u64) -> PendingLoad {
        let importer = Arc::clone(&self.importer);
        let settings = Arc::clone(&self.settings);
        let state = Arc::clone(&self.state);

        async move {
            let loaded = resolve(importer.as_ref(), &settings, &summary).await;
            let superseded = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                match state.in_flight.get(&summary.plugin_id) {
                    Some((current, _)) if *current == ticket => {
                        state.in_flight.remove(&summary.plugin_id);
                        if loaded.is_loaded {
                            state
                                .cache
                                .insert(summary.plugin_id.clone(), loaded.clone());
                        }
                        false
                    }
                    _ => true,
                }
            };
            if superseded {
                debug!(plugin_id = %summary.plugin_id, "discarding load superseded by unload");
                run_on_unload(&loaded).await;
            }
            loaded
        }
        .boxed()
        .shared()
    }

    /// Run `onUnload` if the plugin is loaded, then drop it from the cache.
    ///
    /// Hook failures are logged and never propagated.
    pub async fn unload_plugin(&self, id: &str) {
        let cached = self.state().cache.get(id).cloned();
        if let Some(plugin) = &cached {
            run_on_unload(plugin).await;
        }

        let mut state = self.state();
        state.cache.remove(id);
        state.in_flight.remove(id);
        if cached.is_some() {
            info!(plugin_id = %id, "plugin unloaded");
        }
    }

    /// Unload every cached plugin concurrently.
    pub async fn unload_all(&self) {
        let ids: Vec<String> = {
            let mut state = self.state();
            state.in_flight.clear();
            state.cache.keys().cloned().collect()
        };
        join_all(ids.iter().map(|id| self.unload_plugin(id))).await;
        debug!(count = ids.len(), "all plugins unloaded");
    }

    pub fn get_plugin(&self, id: &str) -> Option<LoadedPlugin> {
        self.state().cache.get(id).cloned()
    }

    /// Every cached plugin, ordered by id.
    pub fn get_all_plugins(&self) -> Vec<LoadedPlugin> {
        let mut plugins: Vec<LoadedPlugin> = self.state().cache.values().cloned().collect();
        plugins.sort_by(|a, b| a.id.cmp(&b.id));
        plugins
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.state().cache.get(id).is_some_and(|p| p.is_loaded)
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("PluginLoader")
            .field("settings", &self.settings)
            .field("cached", &state.cache.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}

async fn resolve(
    importer: &dyn ModuleImporter,
    settings: &LoaderSettings,
    summary: &PluginSummary,
) -> LoadedPlugin {
    let id = summary.plugin_id.as_str();

    if !summary.has_frontend {
        debug!(plugin_id = %id, "backend-only plugin, nothing to import");
        let exports = PluginExports::manifest_only(summary.manifest_or_placeholder());
        return LoadedPlugin::loaded(id, exports);
    }

    let url = match settings.module_url(summary) {
        Ok(url) => url,
        Err(e) => {
            warn!(plugin_id = %id, error = %e, "plugin module URL is invalid");
            return LoadedPlugin::failed(id, summary.manifest_or_placeholder(), e);
        }
    };
    debug!(plugin_id = %id, url = %url, "importing plugin module");

    let attempt = tokio::time::timeout(
        settings.load_timeout,
        import_and_initialize(importer, settings, summary, &url),
    )
    .await;

    match attempt {
        Ok(Ok(exports)) => {
            info!(plugin_id = %id, version = %exports.manifest.version, "plugin loaded");
            LoadedPlugin::loaded(id, exports)
        }
        Ok(Err(e)) => {
            warn!(plugin_id = %id, error = %e, "plugin failed to load");
            LoadedPlugin::failed(id, summary.manifest_or_placeholder(), e)
        }
        Err(_) => {
            let e = WaypointError::Timeout {
                duration: settings.load_timeout,
            };
            warn!(plugin_id = %id, error = %e, "plugin load timed out");
            LoadedPlugin::failed(id, summary.manifest_or_placeholder(), e)
        }
    }
}

async fn import_and_initialize(
    importer: &dyn ModuleImporter,
    settings: &LoaderSettings,
    summary: &PluginSummary,
    url: &str,
) -> Result<PluginExports, WaypointError> {
    let id = summary.plugin_id.as_str();
    let exports = importer.import(id, url).await?;

    if exports.manifest.id != id {
        return Err(WaypointError::Contract {
            plugin_id: id.to_string(),
            message: format!(
                "module manifest declares id '{}', expected '{id}'",
                exports.manifest.id
            ),
        });
    }
    validate_manifest(&exports.manifest)?;
    check_host_compatibility(&exports.manifest, &settings.host_version)?;

    if let Some(on_load) = &exports.on_load {
        on_load().await.map_err(|e| match e {
            hook @ WaypointError::Hook { .. } => hook,
            other => WaypointError::Hook {
                plugin_id: id.to_string(),
                hook: LifecycleHookKind::OnLoad,
                message: other.to_string(),
            },
        })?;
    }
    Ok(exports)
}

async fn run_on_unload(plugin: &LoadedPlugin) {
    if !plugin.is_loaded {
        return;
    }
    let Some(on_unload) = plugin.exports.as_ref().and_then(|e| e.on_unload.clone()) else {
        return;
    };
    if let Err(e) = on_unload().await {
        warn!(plugin_id = %plugin.id, error = %e, "onUnload failed, continuing");
    }
}
