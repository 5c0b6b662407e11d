// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route, nav and widget projection over the loaded plugin set.
//!
//! Everything here is a pure function of `&[LoadedPlugin]`. Only plugins with
//! `is_loaded = true` contribute, and a plugin whose callback fails is logged
//! and skipped without affecting the others.

use std::collections::BTreeMap;

use tokio::sync::watch;
use tracing::warn;
use waypoint_core::{NavItem, RouteDef, WaypointError, WidgetDef};

use crate::loader::LoadedPlugin;
use crate::registry::RegistryState;

/// Prefix `path` with the owning plugin's namespace, `/plugins/{id}`.
pub fn namespaced_path(plugin_id: &str, path: &str) -> String {
    let relative = path.trim_start_matches('/');
    if relative.is_empty() {
        format!("/plugins/{plugin_id}")
    } else {
        format!("/plugins/{plugin_id}/{relative}")
    }
}

/// Nav items from every loaded plugin, stably sorted by effective order.
pub fn project_nav_items(loaded: &[LoadedPlugin]) -> Vec<NavItem> {
    let mut items: Vec<NavItem> = loaded
        .iter()
        .filter(|p| p.is_loaded)
        .filter_map(|p| {
            let get = p.exports.as_ref()?.get_nav_items.as_ref()?;
            contribution(&p.id, "getNavItems", get())
        })
        .flatten()
        .collect();
    items.sort_by_key(NavItem::effective_order);
    items
}

/// Routes from every loaded plugin, each path namespaced under its plugin.
pub fn project_routes(loaded: &[LoadedPlugin]) -> Vec<RouteDef> {
    loaded
        .iter()
        .filter(|p| p.is_loaded)
        .filter_map(|p| {
            let get = p.exports.as_ref()?.get_routes.as_ref()?;
            let routes = contribution(&p.id, "getRoutes", get())?;
            Some(routes.into_iter().map(move |mut route| {
                route.path = namespaced_path(&p.id, &route.path);
                route
            }))
        })
        .flatten()
        .collect()
}

/// Widgets grouped by slot; each slot is ordered like nav items.
pub fn project_widgets(loaded: &[LoadedPlugin]) -> BTreeMap<String, Vec<WidgetDef>> {
    let mut slots: BTreeMap<String, Vec<WidgetDef>> = BTreeMap::new();
    for widget in loaded
        .iter()
        .filter(|p| p.is_loaded)
        .filter_map(|p| p.exports.as_ref()?.widgets.as_ref())
        .flatten()
    {
        slots
            .entry(widget.slot.clone())
            .or_default()
            .push(widget.clone());
    }
    for widgets in slots.values_mut() {
        widgets.sort_by_key(WidgetDef::effective_order);
    }
    slots
}

fn contribution<T>(
    plugin_id: &str,
    callback: &str,
    result: Result<Vec<T>, WaypointError>,
) -> Option<Vec<T>> {
    match result {
        Ok(items) => Some(items),
        Err(e) => {
            warn!(plugin_id, callback, error = %e, "plugin contribution failed, skipping");
            None
        }
    }
}

/// A derived snapshot of everything plugins contribute to the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub nav_items: Vec<NavItem>,
    pub routes: Vec<RouteDef>,
    pub widgets: BTreeMap<String, Vec<WidgetDef>>,
}

impl Projection {
    pub fn derive(loaded: &[LoadedPlugin]) -> Self {
        Self {
            nav_items: project_nav_items(loaded),
            routes: project_routes(loaded),
            widgets: project_widgets(loaded),
        }
    }
}

/// Keeps a [`Projection`] in step with registry state.
///
/// Every registry change wakes [`ProjectionWatcher::changed`], which derives
/// a fresh projection from the new loaded set.
#[derive(Debug)]
pub struct ProjectionWatcher {
    rx: watch::Receiver<RegistryState>,
    current: Projection,
}

impl ProjectionWatcher {
    pub fn new(mut rx: watch::Receiver<RegistryState>) -> Self {
        let loaded = rx.borrow_and_update().loaded.clone();
        Self {
            rx,
            current: Projection::derive(&loaded),
        }
    }

    pub fn current(&self) -> &Projection {
        &self.current
    }

    /// Wait for the next registry change and re-derive.
    pub async fn changed(&mut self) -> Result<&Projection, WaypointError> {
        self.rx
            .changed()
            .await
            .map_err(|_| WaypointError::Internal("plugin registry was dropped".to_string()))?;
        let loaded = self.rx.borrow_and_update().loaded.clone();
        self.current = Projection::derive(&loaded);
        Ok(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::{PluginExports, PluginManifest};
    use waypoint_test_utils::fixtures::{nav, route, widget};

    fn plugin(id: &str, exports: PluginExports) -> LoadedPlugin {
        LoadedPlugin::loaded(id, exports)
    }

    fn exports(id: &str) -> PluginExports {
        PluginExports::manifest_only(PluginManifest::placeholder(id, "1.0.0"))
    }

    #[test]
    fn namespacing_handles_slashes_and_root() {
        assert_eq!(namespaced_path("foo", "/bar"), "/plugins/foo/bar");
        assert_eq!(namespaced_path("foo", "bar/baz"), "/plugins/foo/bar/baz");
        assert_eq!(namespaced_path("foo", "/"), "/plugins/foo");
        assert_eq!(namespaced_path("foo", ""), "/plugins/foo");
    }

    #[test]
    fn nav_default_order_sorts_after_explicit() {
        let loaded = vec![plugin(
            "a",
            exports("a").with_nav_items(|| {
                Ok(vec![
                    nav("five", "/5", Some(5)),
                    nav("default", "/d", None),
                    nav("one", "/1", Some(1)),
                ])
            }),
        )];
        let labels: Vec<_> = project_nav_items(&loaded)
            .into_iter()
            .map(|n| n.label)
            .collect();
        assert_eq!(labels, vec!["one", "five", "default"]);
    }

    #[test]
    fn nav_ties_keep_loaded_order() {
        let loaded = vec![
            plugin("a", exports("a").with_nav_items(|| Ok(vec![nav("a", "/a", None)]))),
            plugin("b", exports("b").with_nav_items(|| Ok(vec![nav("b", "/b", Some(100))]))),
            plugin("c", exports("c").with_nav_items(|| Ok(vec![nav("c", "/c", None)]))),
        ];
        let labels: Vec<_> = project_nav_items(&loaded)
            .into_iter()
            .map(|n| n.label)
            .collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[test]
    fn failing_and_unloaded_plugins_do_not_contribute() {
        let loaded = vec![
            plugin(
                "broken",
                exports("broken").with_routes(|| Err(WaypointError::Internal("boom".into()))),
            ),
            LoadedPlugin::failed("failed", PluginManifest::placeholder("failed", "1.0.0"), "x"),
            plugin("foo", exports("foo").with_routes(|| Ok(vec![route("/bar", "Bar")]))),
        ];
        let routes = project_routes(&loaded);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/plugins/foo/bar");
        assert_eq!(routes[0].component, "Bar");
    }

    #[test]
    fn widgets_grouped_by_slot() {
        let loaded = vec![
            plugin(
                "a",
                exports("a").with_widgets(vec![
                    widget("late", "dashboard", None),
                    widget("side", "sidebar", Some(1)),
                ]),
            ),
            plugin("b", exports("b").with_widgets(vec![widget("early", "dashboard", Some(10))])),
        ];
        let slots = project_widgets(&loaded);
        let dashboard: Vec<_> = slots["dashboard"].iter().map(|w| w.id.as_str()).collect();
        assert_eq!(dashboard, vec!["early", "late"]);
        assert_eq!(slots["sidebar"].len(), 1);
    }

    #[tokio::test]
    async fn watcher_rederives_on_change() {
        let (tx, rx) = watch::channel(RegistryState::default());
        let mut watcher = ProjectionWatcher::new(rx);
        assert!(watcher.current().routes.is_empty());

        tx.send_modify(|s| {
            s.loaded.push(plugin(
                "foo",
                exports("foo").with_routes(|| Ok(vec![route("/bar", "Bar")])),
            ))
        });
        let projection = watcher.changed().await.unwrap();
        assert_eq!(projection.routes[0].path, "/plugins/foo/bar");

        tx.send_modify(|s| s.loaded.clear());
        assert!(watcher.changed().await.unwrap().routes.is_empty());

        drop(tx);
        assert!(watcher.changed().await.is_err());
    }
}
