// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wires the HTTP backend and the WASM importer into the plugin runtime.

use std::sync::Arc;

use tracing::debug;
use waypoint_client::HttpPluginBackend;
use waypoint_config::WaypointConfig;
use waypoint_core::WaypointError;
use waypoint_plugin::{LoaderSettings, PluginLoader, PluginProvider, PluginRegistry};
use waypoint_sandbox::WasmModuleImporter;

pub fn build_registry(config: &WaypointConfig) -> Result<Arc<PluginRegistry>, WaypointError> {
    let backend = HttpPluginBackend::new(&config.backend)?;
    let importer = WasmModuleImporter::new(config.sandbox.clone())?;
    let settings = LoaderSettings::from_config(config)?;
    debug!(
        backend = %config.backend.base_url,
        assets = %settings.asset_base_url,
        host_version = %settings.host_version,
        "plugin runtime configured"
    );

    let loader = Arc::new(PluginLoader::new(Arc::new(importer), settings));
    Ok(Arc::new(PluginRegistry::new(Arc::new(backend), loader)))
}

pub fn build_provider(config: &WaypointConfig) -> Result<Arc<PluginProvider>, WaypointError> {
    Ok(Arc::new(PluginProvider::new(build_registry(config)?)))
}
