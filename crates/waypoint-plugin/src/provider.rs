// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide plugin bootstrap.
//!
//! [`PluginProvider`] runs the initial fetch-and-load pass once at startup
//! and publishes a [`Readiness`] value the rest of the application can wait
//! on. A failed initial fetch leaves the application usable but degraded;
//! individual plugin load failures do not affect readiness.

use std::sync::Arc;

use strum::Display;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::registry::PluginRegistry;

/// Bootstrap progress as seen by the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Readiness {
    /// Initial discovery and load have not finished.
    Bootstrapping,
    /// Plugins are fetched and every enabled frontend was attempted.
    Ready,
    /// The installed list could not be fetched; the app runs without plugins.
    Degraded(String),
}

/// Owns the registry for the lifetime of the process.
pub struct PluginProvider {
    registry: Arc<PluginRegistry>,
    readiness: watch::Sender<Readiness>,
    bootstrapped: Mutex<bool>,
}

impl PluginProvider {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        let (readiness, _) = watch::channel(Readiness::Bootstrapping);
        Self {
            registry,
            readiness,
            bootstrapped: Mutex::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.readiness.subscribe()
    }

    /// Fetch installed and discovered plugins, then load every frontend.
    ///
    /// Runs once; later calls (including concurrent ones) wait for the first
    /// and return its outcome.
    pub async fn bootstrap(&self) -> Readiness {
        let mut done = self.bootstrapped.lock().await;
        if *done {
            return self.readiness();
        }

        info!("bootstrapping plugins");
        let (installed, discovered) = tokio::join!(
            self.registry.fetch_plugins(),
            self.registry.fetch_discovered_plugins()
        );

        let readiness = match installed {
            Ok(_) => {
                self.registry.load_all_frontends().await;
                let failures = self.registry.load_errors();
                info!(
                    discovered = discovered.len(),
                    failed = failures.len(),
                    "plugin bootstrap complete"
                );
                Readiness::Ready
            }
            Err(e) => {
                warn!(error = %e, "plugin bootstrap degraded");
                Readiness::Degraded(e.to_string())
            }
        };

        *done = true;
        self.readiness.send_replace(readiness.clone());
        readiness
    }

    /// Run [`bootstrap`](Self::bootstrap) on a background task.
    pub fn spawn_bootstrap(self: &Arc<Self>) -> JoinHandle<Readiness> {
        let provider = Arc::clone(self);
        tokio::spawn(async move { provider.bootstrap().await })
    }

    /// Wait until bootstrap has finished, successfully or not.
    pub async fn wait_ready(&self) -> Readiness {
        let mut rx = self.readiness.subscribe();
        match rx.wait_for(|r| *r != Readiness::Bootstrapping).await {
            Ok(readiness) => readiness.clone(),
            Err(_) => self.readiness(),
        }
    }

    /// Tear down all plugin state, e.g. on logout. A later
    /// [`bootstrap`](Self::bootstrap) starts over.
    pub async fn shutdown(&self) {
        let mut done = self.bootstrapped.lock().await;
        self.registry.reset().await;
        *done = false;
        self.readiness.send_replace(Readiness::Bootstrapping);
        info!("plugin provider shut down");
    }
}

impl std::fmt::Debug for PluginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProvider")
            .field("readiness", &*self.readiness.borrow())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use semver::Version;
    use waypoint_test_utils::{MockBackend, MockImporter, MockModule, fixtures};

    use crate::loader::{LoaderSettings, PluginLoader};

    fn provider(backend: &MockBackend, importer: &MockImporter) -> Arc<PluginProvider> {
        let settings = LoaderSettings {
            asset_base_url: "http://assets.test/plugins".into(),
            module_entry: "frontend/plugin.wasm".into(),
            load_timeout: Duration::from_secs(5),
            host_version: Version::new(1, 0, 0),
        };
        let loader = Arc::new(PluginLoader::new(Arc::new(importer.clone()), settings));
        let registry = Arc::new(PluginRegistry::new(Arc::new(backend.clone()), loader));
        Arc::new(PluginProvider::new(registry))
    }

    #[tokio::test]
    async fn bootstrap_loads_and_becomes_ready() {
        let backend = MockBackend::with_plugins(vec![fixtures::summary("mileage", true)]);
        let importer = MockImporter::new();
        importer.script("mileage", MockModule::new(fixtures::manifest("mileage", "1.0.0")));
        let provider = provider(&backend, &importer);
        assert_eq!(provider.readiness(), Readiness::Bootstrapping);

        let waiter = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.wait_ready().await })
        };
        provider.spawn_bootstrap().await.unwrap();

        assert_eq!(waiter.await.unwrap(), Readiness::Ready);
        assert!(provider.registry().loader().is_loaded("mileage"));
        assert!(provider.registry().snapshot().is_initialized);
    }

    #[tokio::test]
    async fn bootstrap_runs_once() {
        let backend = MockBackend::with_plugins(vec![fixtures::summary("mileage", true)]);
        let importer = MockImporter::new();
        importer.script("mileage", MockModule::new(fixtures::manifest("mileage", "1.0.0")));
        let provider = provider(&backend, &importer);

        let (a, b) = tokio::join!(provider.bootstrap(), provider.bootstrap());
        assert_eq!(a, Readiness::Ready);
        assert_eq!(b, Readiness::Ready);
        let lists = backend
            .log()
            .entries()
            .iter()
            .filter(|e| *e == "backend:list")
            .count();
        assert_eq!(lists, 1);
    }

    #[tokio::test]
    async fn failed_fetch_degrades() {
        let backend = MockBackend::new();
        backend.fail_on("list").await;
        let provider = provider(&backend, &MockImporter::new());

        match provider.bootstrap().await {
            Readiness::Degraded(message) => assert!(message.contains("simulated failure")),
            other => panic!("expected degraded, got {other:?}"),
        }
        assert_eq!(provider.readiness().to_string(), "degraded");
    }

    #[tokio::test]
    async fn shutdown_resets_and_allows_rebootstrap() {
        let backend = MockBackend::with_plugins(vec![fixtures::summary("mileage", true)]);
        let importer = MockImporter::new();
        importer.script("mileage", MockModule::new(fixtures::manifest("mileage", "1.0.0")));
        let provider = provider(&backend, &importer);

        provider.bootstrap().await;
        provider.shutdown().await;
        assert_eq!(provider.readiness(), Readiness::Bootstrapping);
        assert!(provider.registry().loader().get_all_plugins().is_empty());

        assert_eq!(provider.bootstrap().await, Readiness::Ready);
        assert_eq!(importer.import_count("mileage"), 2);
    }
}
