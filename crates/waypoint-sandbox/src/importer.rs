// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! [`ModuleImporter`] backed by the WASM module host.
//!
//! An import fetches the module bytes over HTTP, compiles and instantiates
//! them, reads the mandatory `manifest` export and wraps the optional exports
//! as [`PluginExports`] callbacks. Contribution exports are evaluated on the
//! import's blocking task, so projections never enter the guest.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use waypoint_config::model::SandboxConfig;
use waypoint_core::{
    LifecycleHookKind, ModuleImporter, NavItem, PluginExports, PluginManifest, RouteDef,
    WaypointError, WidgetDef,
};

use crate::runtime::{GuestError, GuestInstance, ModuleHost};

/// Imports plugin modules served over HTTP into the WASM sandbox.
#[derive(Debug, Clone)]
pub struct WasmModuleImporter {
    http: reqwest::Client,
    host: Arc<ModuleHost>,
}

impl WasmModuleImporter {
    pub fn new(limits: SandboxConfig) -> Result<Self, WaypointError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| WaypointError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            host: Arc::new(ModuleHost::new(limits)?),
        })
    }

    pub fn host(&self) -> &ModuleHost {
        &self.host
    }

    /// Downloads the module at `url`, refusing anything over the size limit.
    async fn fetch(&self, plugin_id: &str, url: &str) -> Result<Vec<u8>, WaypointError> {
        let module_err = |message: String| WaypointError::Module {
            plugin_id: plugin_id.to_string(),
            message,
        };
        let limit = self.host.limits().max_module_bytes;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| module_err(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(module_err(format!("fetching {url} returned {status}")));
        }
        if let Some(length) = response.content_length()
            && length > limit as u64
        {
            return Err(module_err(format!(
                "module is {length} bytes, limit is {limit}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| module_err(format!("failed to read module body: {e}")))?;
        debug!(plugin_id, url, size = bytes.len(), "fetched module");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ModuleImporter for WasmModuleImporter {
    async fn import(&self, plugin_id: &str, url: &str) -> Result<PluginExports, WaypointError> {
        let bytes = self.fetch(plugin_id, url).await?;

        let host = Arc::clone(&self.host);
        let id = plugin_id.to_string();
        let exports = tokio::task::spawn_blocking(move || exports_from_bytes(&host, &id, &bytes))
            .await
            .map_err(|e| WaypointError::Internal(format!("module import task failed: {e}")))??;

        info!(
            plugin_id,
            version = %exports.manifest.version,
            nav_items = exports.get_nav_items.is_some(),
            routes = exports.get_routes.is_some(),
            on_load = exports.on_load.is_some(),
            "imported plugin module"
        );
        Ok(exports)
    }
}

/// Compiles, instantiates and evaluates a module's export surface.
///
/// Contribution exports are evaluated once here. A failing `nav_items` or
/// `routes` export is kept as an error its callback returns on every read;
/// a failing `widgets` export fails the import. Lifecycle hooks stay
/// callbacks into the live instance.
pub fn exports_from_bytes(
    host: &ModuleHost,
    plugin_id: &str,
    bytes: &[u8],
) -> Result<PluginExports, WaypointError> {
    let module = host.compile(plugin_id, bytes)?;
    let guest = host.instantiate(plugin_id, &module)?;

    let contract = |message: String| WaypointError::Contract {
        plugin_id: plugin_id.to_string(),
        message,
    };

    if !guest.has_export("manifest") {
        return Err(contract("module does not export a manifest".to_string()));
    }
    let raw = guest
        .call("manifest")
        .map_err(|e| contract(format!("manifest export failed: {e}")))?
        .ok_or_else(|| contract("manifest export produced no output".to_string()))?;
    let manifest: PluginManifest =
        serde_json::from_str(&raw).map_err(|e| contract(format!("invalid manifest JSON: {e}")))?;

    guest.grant_permissions(manifest.required_permissions.clone());

    let mut exports = PluginExports::manifest_only(manifest);

    if guest.has_export("nav_items") {
        let nav = read_json::<Vec<NavItem>>(&guest, "nav_items", LifecycleHookKind::NavItems)
            .map_err(|e| e.to_string());
        let plugin_id = plugin_id.to_string();
        exports = exports.with_nav_items(move || {
            replay(&plugin_id, LifecycleHookKind::NavItems, &nav)
        });
    }
    if guest.has_export("routes") {
        let routes = read_json::<Vec<RouteDef>>(&guest, "routes", LifecycleHookKind::Routes)
            .map_err(|e| e.to_string());
        let plugin_id = plugin_id.to_string();
        exports = exports.with_routes(move || {
            replay(&plugin_id, LifecycleHookKind::Routes, &routes)
        });
    }
    if guest.has_export("widgets") {
        let widgets = read_json::<Vec<WidgetDef>>(&guest, "widgets", LifecycleHookKind::Widgets)?;
        exports = exports.with_widgets(widgets);
    }
    if guest.has_export("on_load") {
        let guest = guest.clone();
        exports = exports.with_on_load(move || {
            let guest = guest.clone();
            async move { run_hook(&guest, "on_load", LifecycleHookKind::OnLoad).await }.boxed()
        });
    }
    if guest.has_export("on_unload") {
        let guest = guest.clone();
        exports = exports.with_on_unload(move || {
            let guest = guest.clone();
            async move { run_hook(&guest, "on_unload", LifecycleHookKind::OnUnload).await }
                .boxed()
        });
    }

    Ok(exports)
}

/// Calls a contribution export and decodes its JSON output.
fn read_json<T: DeserializeOwned>(
    guest: &GuestInstance,
    export: &str,
    hook: LifecycleHookKind,
) -> Result<T, WaypointError> {
    let raw = guest
        .call(export)
        .map_err(|e| hook_err(guest, hook, e.to_string()))?
        .ok_or_else(|| hook_err(guest, hook, format!("'{export}' produced no output")))?;
    serde_json::from_str(&raw)
        .map_err(|e| hook_err(guest, hook, format!("'{export}' returned invalid JSON: {e}")))
}

/// Hands out a contribution evaluated at import time.
fn replay<T: Clone>(
    plugin_id: &str,
    hook: LifecycleHookKind,
    evaluated: &Result<T, String>,
) -> Result<T, WaypointError> {
    evaluated.clone().map_err(|message| WaypointError::Hook {
        plugin_id: plugin_id.to_string(),
        hook,
        message,
    })
}

async fn run_hook(
    guest: &GuestInstance,
    export: &str,
    hook: LifecycleHookKind,
) -> Result<(), WaypointError> {
    match guest.call_async(export).await {
        Ok(_) => Ok(()),
        Err(GuestError::MissingExport(_)) => Ok(()),
        Err(e) => Err(hook_err(guest, hook, e.to_string())),
    }
}

fn hook_err(guest: &GuestInstance, hook: LifecycleHookKind, message: String) -> WaypointError {
    WaypointError::Hook {
        plugin_id: guest.plugin_id().to_string(),
        hook,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_test_utils::GuestModule;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MANIFEST: &str = r#"{"id":"mileage","name":"Mileage","version":"1.2.0","requiredPermissions":["mileage.view"]}"#;

    fn host() -> ModuleHost {
        ModuleHost::new(SandboxConfig::default()).unwrap()
    }

    #[test]
    fn full_export_surface_is_wrapped() {
        let wasm = GuestModule::new()
            .json_export("manifest", MANIFEST)
            .json_export(
                "nav_items",
                r#"[{"label":"Mileage","path":"/mileage","order":20}]"#,
            )
            .json_export("routes", r#"[{"path":"/trips","component":"TripList"}]"#)
            .json_export(
                "widgets",
                r#"[{"id":"km","title":"Kilometres","slot":"dashboard"}]"#,
            )
            .func(r#"(func (export "on_load"))"#)
            .wasm();

        let exports = exports_from_bytes(&host(), "mileage", &wasm).unwrap();
        assert_eq!(exports.manifest.id, "mileage");
        assert!(exports.manifest.required_permissions.contains("mileage.view"));

        let nav = (exports.get_nav_items.as_ref().unwrap())().unwrap();
        assert_eq!(nav[0].path, "/mileage");
        assert_eq!(nav[0].order, Some(20));

        let routes = (exports.get_routes.as_ref().unwrap())().unwrap();
        assert_eq!(routes[0].component, "TripList");

        assert_eq!(exports.widgets.as_ref().unwrap()[0].slot, "dashboard");
        assert!(exports.on_load.is_some());
        assert!(exports.on_unload.is_none());
    }

    #[test]
    fn contributions_are_evaluated_at_import() {
        let mut module = GuestModule::new();
        let (offset, len) = module.place(r#"[{"label":"Mileage","path":"/mileage"}]"#);
        let wasm = module
            .json_export("manifest", MANIFEST)
            .func("(global $called (mut i32) (i32.const 0))")
            .func(&format!(
                r#"(func (export "nav_items")
                     (if (global.get $called) (then unreachable))
                     (global.set $called (i32.const 1))
                     (call $set_output (i32.const {offset}) (i32.const {len})))"#
            ))
            .func(r#"(func (export "routes") unreachable)"#)
            .wasm();
        let exports = exports_from_bytes(&host(), "mileage", &wasm).unwrap();

        // The guest traps on a second nav_items call, so repeated reads
        // must come from the value captured at import.
        let get_nav = exports.get_nav_items.as_ref().unwrap();
        assert_eq!(get_nav().unwrap()[0].label, "Mileage");
        assert_eq!(get_nav().unwrap()[0].label, "Mileage");

        let get_routes = exports.get_routes.as_ref().unwrap();
        for _ in 0..2 {
            match get_routes().unwrap_err() {
                WaypointError::Hook {
                    plugin_id, hook, ..
                } => {
                    assert_eq!(plugin_id, "mileage");
                    assert_eq!(hook, LifecycleHookKind::Routes);
                }
                other => panic!("expected hook error, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_manifest_export_is_contract_error() {
        let wasm = GuestModule::new()
            .json_export("routes", "[]")
            .wasm();
        let err = exports_from_bytes(&host(), "mileage", &wasm).unwrap_err();
        match err {
            WaypointError::Contract { plugin_id, message } => {
                assert_eq!(plugin_id, "mileage");
                assert!(message.contains("manifest"));
            }
            other => panic!("expected contract error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_manifest_is_contract_error() {
        let wasm = GuestModule::new()
            .json_export("manifest", r#"{"id":"mileage"}"#)
            .wasm();
        let err = exports_from_bytes(&host(), "mileage", &wasm).unwrap_err();
        assert!(err.to_string().contains("invalid manifest JSON"), "got {err}");
    }

    #[test]
    fn bad_widget_json_fails_import() {
        let wasm = GuestModule::new()
            .json_export("manifest", MANIFEST)
            .json_export("widgets", r#"{"not":"a list"}"#)
            .wasm();
        let err = exports_from_bytes(&host(), "mileage", &wasm).unwrap_err();
        assert!(matches!(
            err,
            WaypointError::Hook {
                hook: LifecycleHookKind::Widgets,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn trapping_on_load_is_hook_error() {
        let wasm = GuestModule::new()
            .json_export("manifest", MANIFEST)
            .func(r#"(func (export "on_load") unreachable)"#)
            .wasm();
        let exports = exports_from_bytes(&host(), "mileage", &wasm).unwrap();
        let err = (exports.on_load.as_ref().unwrap())().await.unwrap_err();
        assert!(matches!(
            err,
            WaypointError::Hook {
                hook: LifecycleHookKind::OnLoad,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn import_fetches_and_evaluates_module() {
        let server = MockServer::start().await;
        let wasm = GuestModule::new().json_export("manifest", MANIFEST).wasm();
        Mock::given(method("GET"))
            .and(path("/static/plugins/mileage/frontend/plugin.wasm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(wasm))
            .expect(1)
            .mount(&server)
            .await;

        let importer = WasmModuleImporter::new(SandboxConfig::default()).unwrap();
        let url = format!(
            "{}/static/plugins/mileage/frontend/plugin.wasm?v=1.2.0",
            server.uri()
        );
        let exports = importer.import("mileage", &url).await.unwrap();
        assert_eq!(exports.manifest.version, "1.2.0");
        assert!(exports.is_manifest_only());
        assert_eq!(importer.host().cached_modules(), 1);
    }

    #[tokio::test]
    async fn missing_module_is_module_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let importer = WasmModuleImporter::new(SandboxConfig::default()).unwrap();
        let err = importer
            .import("mileage", &format!("{}/nope.wasm", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, WaypointError::Module { .. }), "got {err:?}");
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn oversized_download_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let importer = WasmModuleImporter::new(SandboxConfig {
            max_module_bytes: 1024,
            ..SandboxConfig::default()
        })
        .unwrap();
        let err = importer
            .import("mileage", &format!("{}/big.wasm", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("limit is 1024"), "got {err}");
    }
}
