// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire and domain types shared by the backend client, the module host and
//! the plugin registry.
//!
//! All types serialize as camelCase JSON to match the plugin-management
//! backend.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

/// Default nav/widget ordering weight when a plugin does not specify one.
pub const DEFAULT_ORDER: i32 = 100;

/// Which parts of a plugin exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginCapabilities {
    #[serde(default)]
    pub backend: bool,
    #[serde(default)]
    pub frontend: bool,
    #[serde(default)]
    pub config: bool,
}

/// A permission a plugin contributes to the host's permission catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDef {
    pub code: String,
    #[serde(default)]
    pub description: String,
}

/// Static description of a plugin's identity and permission surface.
///
/// Supplied by the backend and immutable once a plugin is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    /// Semantic version string.
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub capabilities: PluginCapabilities,
    #[serde(default)]
    pub required_permissions: BTreeSet<String>,
    #[serde(default)]
    pub provided_permissions: Vec<PermissionDef>,
    /// Other plugin ids this plugin needs, mapped to a semver requirement.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Lowest host version the plugin runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_host_version: Option<String>,
}

impl PluginManifest {
    /// Minimal manifest for a plugin whose backend-reported manifest is missing.
    pub fn placeholder(id: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            version: version.to_string(),
            description: None,
            author: None,
            capabilities: PluginCapabilities::default(),
            required_permissions: BTreeSet::new(),
            provided_permissions: Vec::new(),
            dependencies: BTreeMap::new(),
            min_host_version: None,
        }
    }
}

/// Server-reported state of an installed plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub plugin_id: String,
    pub plugin_version: String,
    /// `None` when the backend holds a malformed manifest.
    #[serde(default, deserialize_with = "lenient_manifest")]
    pub manifest: Option<PluginManifest>,
    #[serde(default)]
    pub has_frontend: bool,
    #[serde(default)]
    pub has_backend: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub installed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PluginSummary {
    /// The manifest reported by the backend, or a placeholder built from the id.
    pub fn manifest_or_placeholder(&self) -> PluginManifest {
        self.manifest
            .clone()
            .unwrap_or_else(|| PluginManifest::placeholder(&self.plugin_id, &self.plugin_version))
    }
}

fn default_enabled() -> bool {
    true
}

/// A plugin present in backend storage but not installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPlugin {
    pub plugin_id: String,
    pub plugin_version: String,
    #[serde(default, deserialize_with = "lenient_manifest")]
    pub manifest: Option<PluginManifest>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Full detail for one installed plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    #[serde(flatten)]
    pub summary: PluginSummary,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub config_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub migration_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInstallResponse {
    pub success: bool,
    pub plugin_id: String,
    #[serde(default)]
    pub plugin_version: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResult {
    pub success: bool,
    pub plugin_id: String,
    #[serde(default)]
    pub tables_dropped: bool,
    #[serde(default)]
    pub permissions_removed: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of an enable or disable call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResult {
    pub success: bool,
    pub plugin_id: String,
    pub enabled: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdateResult {
    pub success: bool,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub message: Option<String>,
}

/// A sidebar entry contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavItem {
    pub label: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Sort weight; [`DEFAULT_ORDER`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

impl NavItem {
    pub fn effective_order(&self) -> i32 {
        self.order.unwrap_or(DEFAULT_ORDER)
    }
}

/// A router entry contributed by a plugin. Paths are plugin-relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDef {
    pub path: String,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

/// A dashboard widget contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDef {
    pub id: String,
    pub title: String,
    /// Host surface the widget renders in (e.g. "dashboard", "sidebar").
    pub slot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,
}

impl WidgetDef {
    pub fn effective_order(&self) -> i32 {
        self.order.unwrap_or(DEFAULT_ORDER)
    }
}

/// Names the plugin entry point an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum LifecycleHookKind {
    #[strum(serialize = "onLoad")]
    OnLoad,
    #[strum(serialize = "onUnload")]
    OnUnload,
    #[strum(serialize = "getNavItems")]
    NavItems,
    #[strum(serialize = "getRoutes")]
    Routes,
    #[strum(serialize = "widgets")]
    Widgets,
}

/// Deserializes a manifest, mapping malformed objects to `None` instead of
/// failing the enclosing list.
fn lenient_manifest<'de, D>(deserializer: D) -> Result<Option<PluginManifest>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => match serde_json::from_value::<PluginManifest>(raw) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!(error = %e, "ignoring malformed plugin manifest");
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_with_malformed_manifest_deserializes_to_none() {
        let json = serde_json::json!({
            "pluginId": "expenses-export",
            "pluginVersion": "1.2.0",
            "manifest": {"name": 42},
            "hasFrontend": true,
            "hasBackend": false
        });
        let summary: PluginSummary = serde_json::from_value(json).unwrap();
        assert_eq!(summary.plugin_id, "expenses-export");
        assert!(summary.manifest.is_none());
        assert!(summary.enabled, "enabled defaults to true");
    }

    #[test]
    fn manifest_defaults_optional_sections() {
        let json = serde_json::json!({
            "id": "mileage",
            "name": "Mileage",
            "version": "0.3.1"
        });
        let manifest: PluginManifest = serde_json::from_value(json).unwrap();
        assert_eq!(manifest.capabilities, PluginCapabilities::default());
        assert!(manifest.required_permissions.is_empty());
        assert!(manifest.provided_permissions.is_empty());
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.min_host_version.is_none());
    }

    #[test]
    fn provided_permissions_keep_declared_order() {
        let json = serde_json::json!({
            "id": "per-diem",
            "name": "Per diem",
            "version": "1.0.0",
            "requiredPermissions": ["expenses.read", "expenses.read"],
            "providedPermissions": [
                {"code": "perdiem.write", "description": "Edit rates"},
                {"code": "perdiem.read", "description": "View rates"}
            ]
        });
        let manifest: PluginManifest = serde_json::from_value(json).unwrap();
        assert_eq!(manifest.required_permissions.len(), 1);
        let codes: Vec<&str> = manifest
            .provided_permissions
            .iter()
            .map(|p| p.code.as_str())
            .collect();
        assert_eq!(codes, vec!["perdiem.write", "perdiem.read"]);
    }

    #[test]
    fn plugin_info_flattens_summary() {
        let json = serde_json::json!({
            "pluginId": "mileage",
            "pluginVersion": "0.3.1",
            "hasFrontend": true,
            "hasBackend": true,
            "settings": {"rate": 0.3},
            "migrationVersion": "0004"
        });
        let info: PluginInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.summary.plugin_id, "mileage");
        assert_eq!(info.settings["rate"], 0.3);
        assert_eq!(info.migration_version.as_deref(), Some("0004"));
        assert!(info.config_schema.is_none());
    }

    #[test]
    fn nav_item_default_order_is_100() {
        let item = NavItem {
            label: "Trips".into(),
            path: "/trips".into(),
            icon: None,
            order: None,
            permission: None,
        };
        assert_eq!(item.effective_order(), DEFAULT_ORDER);
    }

    #[test]
    fn hook_kind_display_uses_export_names() {
        assert_eq!(LifecycleHookKind::OnLoad.to_string(), "onLoad");
        assert_eq!(LifecycleHookKind::NavItems.to_string(), "getNavItems");
    }
}
