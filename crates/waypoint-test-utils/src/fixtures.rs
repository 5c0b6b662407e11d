// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Small constructors for plugin data used across tests.

use waypoint_core::{
    DiscoveredPlugin, NavItem, PluginCapabilities, PluginManifest, PluginSummary, RouteDef,
    WidgetDef,
};

pub fn manifest(id: &str, version: &str) -> PluginManifest {
    let mut manifest = PluginManifest::placeholder(id, version);
    manifest.name = format!("{id} plugin");
    manifest.capabilities = PluginCapabilities {
        backend: true,
        frontend: true,
        config: false,
    };
    manifest
}

/// An installed, enabled plugin at version `1.0.0`.
pub fn summary(id: &str, has_frontend: bool) -> PluginSummary {
    PluginSummary {
        plugin_id: id.to_string(),
        plugin_version: "1.0.0".to_string(),
        manifest: Some(manifest(id, "1.0.0")),
        has_frontend,
        has_backend: true,
        enabled: true,
        installed_at: Some(chrono::Utc::now()),
        updated_at: None,
    }
}

pub fn discovered(id: &str, version: &str) -> DiscoveredPlugin {
    DiscoveredPlugin {
        plugin_id: id.to_string(),
        plugin_version: version.to_string(),
        manifest: Some(manifest(id, version)),
        path: Some(format!("/srv/plugins/{id}")),
    }
}

pub fn nav(label: &str, path: &str, order: Option<i32>) -> NavItem {
    NavItem {
        label: label.to_string(),
        path: path.to_string(),
        icon: None,
        order,
        permission: None,
    }
}

pub fn route(path: &str, component: &str) -> RouteDef {
    RouteDef {
        path: path.to_string(),
        component: component.to_string(),
        title: None,
        permission: None,
    }
}

pub fn widget(id: &str, slot: &str, order: Option<i32>) -> WidgetDef {
    WidgetDef {
        id: id.to_string(),
        title: id.to_string(),
        slot: slot.to_string(),
        order,
    }
}
