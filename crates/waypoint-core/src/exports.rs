// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The export surface of a loaded plugin module.
//!
//! [`PluginExports`] is a tagged-capability struct: the manifest is
//! mandatory, every other capability is an optional callback that callers
//! check for presence before invoking.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::WaypointError;
use crate::types::{NavItem, PluginManifest, RouteDef, WidgetDef};

/// Future returned by an async lifecycle hook.
pub type HookFuture = BoxFuture<'static, Result<(), WaypointError>>;

/// An `onLoad`/`onUnload` callback.
pub type LifecycleHook = Arc<dyn Fn() -> HookFuture + Send + Sync>;

/// A `getNavItems` callback.
pub type NavItemsFn = Arc<dyn Fn() -> Result<Vec<NavItem>, WaypointError> + Send + Sync>;

/// A `getRoutes` callback.
pub type RoutesFn = Arc<dyn Fn() -> Result<Vec<RouteDef>, WaypointError> + Send + Sync>;

/// What a dynamically loaded module exposes to the host.
#[derive(Clone)]
pub struct PluginExports {
    pub manifest: PluginManifest,
    pub get_nav_items: Option<NavItemsFn>,
    pub get_routes: Option<RoutesFn>,
    pub widgets: Option<Vec<WidgetDef>>,
    pub on_load: Option<LifecycleHook>,
    pub on_unload: Option<LifecycleHook>,
}

impl PluginExports {
    /// Exports carrying nothing but a manifest.
    pub fn manifest_only(manifest: PluginManifest) -> Self {
        Self {
            manifest,
            get_nav_items: None,
            get_routes: None,
            widgets: None,
            on_load: None,
            on_unload: None,
        }
    }

    pub fn with_nav_items<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<Vec<NavItem>, WaypointError> + Send + Sync + 'static,
    {
        self.get_nav_items = Some(Arc::new(f));
        self
    }

    pub fn with_routes<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<Vec<RouteDef>, WaypointError> + Send + Sync + 'static,
    {
        self.get_routes = Some(Arc::new(f));
        self
    }

    pub fn with_widgets(mut self, widgets: Vec<WidgetDef>) -> Self {
        self.widgets = Some(widgets);
        self
    }

    pub fn with_on_load<F>(mut self, f: F) -> Self
    where
        F: Fn() -> HookFuture + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(f));
        self
    }

    pub fn with_on_unload<F>(mut self, f: F) -> Self
    where
        F: Fn() -> HookFuture + Send + Sync + 'static,
    {
        self.on_unload = Some(Arc::new(f));
        self
    }

    /// True when the module contributes nothing beyond its manifest.
    pub fn is_manifest_only(&self) -> bool {
        self.get_nav_items.is_none()
            && self.get_routes.is_none()
            && self.widgets.is_none()
            && self.on_load.is_none()
            && self.on_unload.is_none()
    }
}

impl std::fmt::Debug for PluginExports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginExports")
            .field("manifest", &self.manifest)
            .field("get_nav_items", &self.get_nav_items.is_some())
            .field("get_routes", &self.get_routes.is_some())
            .field("widgets", &self.widgets)
            .field("on_load", &self.on_load.is_some())
            .field("on_unload", &self.on_unload.is_some())
            .finish()
    }
}
