// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin runtime: manifest checks, frontend loader, registry, bootstrap
//! provider and route/nav projection.
//!
//! The runtime is built against the two traits in `waypoint-core`. A
//! [`PluginRegistry`] talks to the plugin-management backend through a
//! `PluginBackend` and loads frontends through a [`PluginLoader`], which in
//! turn imports modules through a `ModuleImporter`. The [`PluginProvider`]
//! owns the registry for the lifetime of the process.

pub mod loader;
pub mod manifest;
pub mod projection;
pub mod provider;
pub mod registry;

pub use loader::{LoadedPlugin, LoaderSettings, PluginLoader};
pub use manifest::{
    check_dependencies, check_host_compatibility, parse_manifest_json, validate_manifest,
};
pub use projection::{
    Projection, ProjectionWatcher, namespaced_path, project_nav_items, project_routes,
    project_widgets,
};
pub use provider::{PluginProvider, Readiness};
pub use registry::{PluginRegistry, RegistryState};
