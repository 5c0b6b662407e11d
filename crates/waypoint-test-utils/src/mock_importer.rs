// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted module importer for deterministic loader tests.
//!
//! `MockImporter` implements `ModuleImporter` from per-plugin [`MockModule`]
//! scripts and counts imports and hook invocations, so de-duplication and
//! lifecycle ordering can be asserted exactly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;

use waypoint_core::{
    HookFuture, LifecycleHookKind, ModuleImporter, NavItem, PluginExports, PluginManifest,
    RouteDef, WaypointError, WidgetDef,
};

use crate::call_log::CallLog;

/// What a scripted lifecycle hook does when called.
#[derive(Debug, Clone)]
pub enum HookScript {
    Succeed,
    Fail(String),
    /// Sleep, then succeed.
    Delay(Duration),
}

/// Script for one plugin's module.
#[derive(Debug, Clone)]
pub struct MockModule {
    manifest: Option<PluginManifest>,
    nav_items: Option<Result<Vec<NavItem>, String>>,
    routes: Option<Result<Vec<RouteDef>, String>>,
    widgets: Option<Vec<WidgetDef>>,
    on_load: Option<HookScript>,
    on_unload: Option<HookScript>,
    import_delay: Duration,
    import_error: Option<String>,
}

impl MockModule {
    /// A module exporting only `manifest`.
    pub fn new(manifest: PluginManifest) -> Self {
        Self {
            manifest: Some(manifest),
            nav_items: None,
            routes: None,
            widgets: None,
            on_load: None,
            on_unload: None,
            import_delay: Duration::ZERO,
            import_error: None,
        }
    }

    /// A module that evaluates but exports no manifest.
    pub fn without_manifest() -> Self {
        Self {
            manifest: None,
            ..Self::new(PluginManifest::placeholder("unused", "0.0.0"))
        }
    }

    pub fn nav_items(mut self, items: Vec<NavItem>) -> Self {
        self.nav_items = Some(Ok(items));
        self
    }

    /// `getNavItems` is exported but fails when called.
    pub fn failing_nav_items(mut self, message: &str) -> Self {
        self.nav_items = Some(Err(message.to_string()));
        self
    }

    pub fn routes(mut self, routes: Vec<RouteDef>) -> Self {
        self.routes = Some(Ok(routes));
        self
    }

    pub fn failing_routes(mut self, message: &str) -> Self {
        self.routes = Some(Err(message.to_string()));
        self
    }

    pub fn widgets(mut self, widgets: Vec<WidgetDef>) -> Self {
        self.widgets = Some(widgets);
        self
    }

    pub fn on_load(mut self, script: HookScript) -> Self {
        self.on_load = Some(script);
        self
    }

    pub fn on_unload(mut self, script: HookScript) -> Self {
        self.on_unload = Some(script);
        self
    }

    /// Delay the import itself, e.g. to widen a concurrency window.
    pub fn import_delay(mut self, delay: Duration) -> Self {
        self.import_delay = delay;
        self
    }

    /// The import rejects as if the fetch failed.
    pub fn fail_import(mut self, message: &str) -> Self {
        self.import_error = Some(message.to_string());
        self
    }
}

#[derive(Default)]
struct Counts {
    imports: HashMap<String, usize>,
    hooks: HashMap<(String, LifecycleHookKind), usize>,
    urls: Vec<String>,
}

/// A module importer that serves scripted modules.
#[derive(Clone, Default)]
pub struct MockImporter {
    modules: Arc<Mutex<HashMap<String, MockModule>>>,
    counts: Arc<Mutex<Counts>>,
    log: CallLog,
}

impl MockImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record imports and hook calls into `log`.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Serve `module` for `plugin_id`, replacing any earlier script.
    pub fn script(&self, plugin_id: &str, module: MockModule) {
        if let Ok(mut modules) = self.modules.lock() {
            modules.insert(plugin_id.to_string(), module);
        }
    }

    pub fn import_count(&self, plugin_id: &str) -> usize {
        self.counts
            .lock()
            .map(|c| c.imports.get(plugin_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn hook_count(&self, plugin_id: &str, hook: LifecycleHookKind) -> usize {
        self.counts
            .lock()
            .map(|c| {
                c.hooks
                    .get(&(plugin_id.to_string(), hook))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    pub fn on_load_count(&self, plugin_id: &str) -> usize {
        self.hook_count(plugin_id, LifecycleHookKind::OnLoad)
    }

    pub fn on_unload_count(&self, plugin_id: &str) -> usize {
        self.hook_count(plugin_id, LifecycleHookKind::OnUnload)
    }

    /// Every URL passed to `import`, in call order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.counts
            .lock()
            .map(|c| c.urls.clone())
            .unwrap_or_default()
    }

    fn hook(
        &self,
        plugin_id: &str,
        kind: LifecycleHookKind,
        script: HookScript,
    ) -> impl Fn() -> HookFuture + Send + Sync + 'static {
        let counts = Arc::clone(&self.counts);
        let log = self.log.clone();
        let plugin_id = plugin_id.to_string();
        move || {
            if let Ok(mut counts) = counts.lock() {
                *counts.hooks.entry((plugin_id.clone(), kind)).or_default() += 1;
            }
            log.push(format!("hook:{kind}:{plugin_id}"));
            let plugin_id = plugin_id.clone();
            let script = script.clone();
            async move {
                match script {
                    HookScript::Succeed => Ok(()),
                    HookScript::Fail(message) => Err(WaypointError::Hook {
                        plugin_id,
                        hook: kind,
                        message,
                    }),
                    HookScript::Delay(delay) => {
                        tokio::time::sleep(delay).await;
                        Ok(())
                    }
                }
            }
            .boxed()
        }
    }
}

fn contribution<T: Clone + Send + Sync + 'static>(
    plugin_id: &str,
    hook: LifecycleHookKind,
    scripted: Result<Vec<T>, String>,
) -> impl Fn() -> Result<Vec<T>, WaypointError> + Send + Sync + 'static {
    let plugin_id = plugin_id.to_string();
    move || {
        scripted.clone().map_err(|message| WaypointError::Hook {
            plugin_id: plugin_id.clone(),
            hook,
            message,
        })
    }
}

#[async_trait]
impl ModuleImporter for MockImporter {
    async fn import(&self, plugin_id: &str, url: &str) -> Result<PluginExports, WaypointError> {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.imports.entry(plugin_id.to_string()).or_default() += 1;
            counts.urls.push(url.to_string());
        }
        self.log.push(format!("import:{plugin_id}"));

        let module = self
            .modules
            .lock()
            .ok()
            .and_then(|m| m.get(plugin_id).cloned())
            .ok_or_else(|| WaypointError::Module {
                plugin_id: plugin_id.to_string(),
                message: format!("no module served at {url}"),
            })?;

        if !module.import_delay.is_zero() {
            tokio::time::sleep(module.import_delay).await;
        }
        if let Some(message) = module.import_error {
            return Err(WaypointError::Module {
                plugin_id: plugin_id.to_string(),
                message,
            });
        }
        let Some(manifest) = module.manifest else {
            return Err(WaypointError::Contract {
                plugin_id: plugin_id.to_string(),
                message: "module does not export a manifest".to_string(),
            });
        };

        let mut exports = PluginExports::manifest_only(manifest);
        if let Some(items) = module.nav_items {
            exports = exports.with_nav_items(contribution(
                plugin_id,
                LifecycleHookKind::NavItems,
                items,
            ));
        }
        if let Some(routes) = module.routes {
            exports = exports.with_routes(contribution(
                plugin_id,
                LifecycleHookKind::Routes,
                routes,
            ));
        }
        if let Some(widgets) = module.widgets {
            exports = exports.with_widgets(widgets);
        }
        if let Some(script) = module.on_load {
            exports = exports.with_on_load(self.hook(plugin_id, LifecycleHookKind::OnLoad, script));
        }
        if let Some(script) = module.on_unload {
            exports =
                exports.with_on_unload(self.hook(plugin_id, LifecycleHookKind::OnUnload, script));
        }
        Ok(exports)
    }
}
