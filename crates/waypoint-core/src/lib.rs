// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Waypoint plugin runtime.
//!
//! This crate provides the error type, the plugin data model, the
//! [`PluginExports`] capability struct and the two traits the runtime is
//! built against: [`PluginBackend`] for the plugin-management HTTP API and
//! [`ModuleImporter`] for dynamic module loading.

pub mod error;
pub mod exports;
pub mod traits;
pub mod types;

pub use error::WaypointError;
pub use exports::{HookFuture, LifecycleHook, NavItemsFn, PluginExports, RoutesFn};
pub use traits::{ModuleImporter, PluginBackend};
pub use types::{
    DEFAULT_ORDER, DiscoveredPlugin, LifecycleHookKind, NavItem, PermissionDef,
    PluginCapabilities, PluginInfo, PluginInstallResponse, PluginManifest, PluginSummary,
    RouteDef, SettingsUpdateResult, ToggleResult, UninstallResult, WidgetDef,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waypoint_error_attributes_plugin_ids() {
        let contract = WaypointError::Contract {
            plugin_id: "mileage".into(),
            message: "module does not export a manifest".into(),
        };
        assert_eq!(contract.plugin_id(), Some("mileage"));
        assert!(contract.to_string().contains("contract violation"));

        let hook = WaypointError::Hook {
            plugin_id: "mileage".into(),
            hook: LifecycleHookKind::OnLoad,
            message: "boom".into(),
        };
        assert_eq!(hook.to_string(), "onLoad failed for plugin 'mileage': boom");

        let backend = WaypointError::backend("connection refused");
        assert_eq!(backend.plugin_id(), None);
        assert_eq!(backend.to_string(), "backend error: connection refused");
    }

    #[test]
    fn traits_are_object_safe() {
        fn _backend(_: &dyn PluginBackend) {}
        fn _importer(_: &dyn ModuleImporter) {}
    }
}
