// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! wasmtime host for plugin frontend modules.
//!
//! One [`Engine`] is shared by every plugin. Compiled [`Module`]s are cached
//! by the SHA-256 of their bytes, so re-importing an unchanged module skips
//! compilation. Each imported plugin gets a single long-lived
//! [`GuestInstance`] whose store is refuelled before every export call.
//!
//! The engine's epoch counter is shared, so hook deadlines are wall-clock
//! instants kept per store; epoch ticks only trigger the check.
//!
//! Guests talk to the host through three functions in the `waypoint` import
//! module: `log`, `set_output` and `has_permission`.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use waypoint_config::model::SandboxConfig;
use waypoint_core::WaypointError;
use wasmtime::{
    Caller, Config, Engine, Extern, Instance, Linker, Module, Store, Trap, UpdateDeadline,
};

/// Epoch deadline for synchronous export calls; they are bounded by fuel only.
const SYNC_EPOCH_DEADLINE: u64 = 1 << 40;

/// How often a running hook's deadline is checked.
const EPOCH_TICK: Duration = Duration::from_millis(100);

/// Per-plugin store data visible to host functions.
struct HostState {
    plugin_id: String,
    /// Permission codes the guest may query with `has_permission`.
    permissions: BTreeSet<String>,
    /// Payload handed over by the last `set_output` call.
    output: Option<String>,
    /// Wall-clock deadline of the hook currently running, if any.
    deadline: Option<Instant>,
}

/// Why a guest export call did not complete.
#[derive(Debug, Error)]
pub enum GuestError {
    #[error("export '{0}' not found")]
    MissingExport(String),

    #[error("export '{export}' has an unexpected signature: {message}")]
    Signature { export: String, message: String },

    #[error("'{export}' exhausted its fuel budget of {fuel} units")]
    OutOfFuel { export: String, fuel: u64 },

    #[error("'{export}' exceeded its {secs}s deadline")]
    DeadlineExceeded { export: String, secs: u64 },

    #[error("'{export}' trapped: {message}")]
    Trap { export: String, message: String },

    #[error("guest state unavailable: {0}")]
    Unavailable(String),
}

/// Shared engine plus the content-hash keyed compile cache.
pub struct ModuleHost {
    engine: Engine,
    limits: SandboxConfig,
    modules: Mutex<HashMap<String, Module>>,
}

impl ModuleHost {
    /// Creates a host with fuel metering and epoch interruption enabled.
    pub fn new(limits: SandboxConfig) -> Result<Self, WaypointError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.epoch_interruption(true);

        let engine = Engine::new(&config).map_err(|e| {
            WaypointError::Internal(format!("failed to create wasmtime engine: {e}"))
        })?;

        info!(
            fuel = limits.fuel,
            epoch_timeout_secs = limits.epoch_timeout_secs,
            "WASM module host initialized"
        );

        Ok(Self {
            engine,
            limits,
            modules: Mutex::new(HashMap::new()),
        })
    }

    pub fn limits(&self) -> &SandboxConfig {
        &self.limits
    }

    /// Number of distinct compiled modules held in the cache.
    pub fn cached_modules(&self) -> usize {
        self.modules.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Compiles `bytes`, reusing an earlier compilation of identical bytes.
    pub fn compile(&self, plugin_id: &str, bytes: &[u8]) -> Result<Module, WaypointError> {
        if bytes.len() > self.limits.max_module_bytes {
            return Err(WaypointError::Module {
                plugin_id: plugin_id.to_string(),
                message: format!(
                    "module is {} bytes, limit is {}",
                    bytes.len(),
                    self.limits.max_module_bytes
                ),
            });
        }

        let digest = hex::encode(Sha256::digest(bytes));
        if let Some(module) = self.cache()?.get(&digest) {
            debug!(plugin_id, digest = %&digest[..12], "compiled module cache hit");
            return Ok(module.clone());
        }

        let module = Module::new(&self.engine, bytes).map_err(|e| WaypointError::Module {
            plugin_id: plugin_id.to_string(),
            message: format!("failed to compile module: {e}"),
        })?;

        debug!(plugin_id, digest = %&digest[..12], size = bytes.len(), "compiled module");
        Ok(self.cache()?.entry(digest).or_insert(module).clone())
    }

    /// Instantiates `module` into a fresh store owned by `plugin_id`.
    pub fn instantiate(
        &self,
        plugin_id: &str,
        module: &Module,
    ) -> Result<GuestInstance, WaypointError> {
        let state = HostState {
            plugin_id: plugin_id.to_string(),
            permissions: BTreeSet::new(),
            output: None,
            deadline: None,
        };
        let mut store = Store::new(&self.engine, state);
        store.epoch_deadline_callback(|ctx| match ctx.data().deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Trap::Interrupt.into()),
            Some(_) => Ok(UpdateDeadline::Continue(1)),
            None => Ok(UpdateDeadline::Continue(SYNC_EPOCH_DEADLINE)),
        });
        store.set_epoch_deadline(SYNC_EPOCH_DEADLINE);
        store
            .set_fuel(self.limits.fuel)
            .map_err(|e| WaypointError::Internal(format!("failed to set fuel: {e}")))?;

        let mut linker = Linker::new(&self.engine);
        define_host_functions(&mut linker)?;

        let instance =
            linker
                .instantiate(&mut store, module)
                .map_err(|e| WaypointError::Module {
                    plugin_id: plugin_id.to_string(),
                    message: format!("failed to instantiate module: {e:#}"),
                })?;

        if instance.get_memory(&mut store, "memory").is_none() {
            return Err(WaypointError::Contract {
                plugin_id: plugin_id.to_string(),
                message: "module does not export 'memory'".to_string(),
            });
        }

        Ok(GuestInstance {
            plugin_id: plugin_id.to_string(),
            engine: self.engine.clone(),
            fuel: self.limits.fuel,
            epoch_timeout_secs: self.limits.epoch_timeout_secs,
            inner: Arc::new(Mutex::new(GuestState { store, instance })),
        })
    }

    fn cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Module>>, WaypointError> {
        self.modules
            .lock()
            .map_err(|_| WaypointError::Internal("module cache lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field("limits", &self.limits)
            .field("cached_modules", &self.cached_modules())
            .finish()
    }
}

struct GuestState {
    store: Store<HostState>,
    instance: Instance,
}

/// A live plugin instance. Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct GuestInstance {
    plugin_id: String,
    engine: Engine,
    fuel: u64,
    epoch_timeout_secs: u64,
    inner: Arc<Mutex<GuestState>>,
}

impl GuestInstance {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Returns true if the guest exports a function called `name`.
    pub fn has_export(&self, name: &str) -> bool {
        match self.inner.lock() {
            Ok(mut guard) => {
                let GuestState { store, instance } = &mut *guard;
                instance.get_func(&mut *store, name).is_some()
            }
            Err(_) => false,
        }
    }

    /// Replaces the permission set `has_permission` answers from.
    pub fn grant_permissions(&self, permissions: BTreeSet<String>) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.store.data_mut().permissions = permissions;
        }
    }

    /// Calls `export` on the current thread, bounded by fuel.
    ///
    /// Returns whatever the guest handed to `set_output` during the call.
    pub fn call(&self, export: &str) -> Result<Option<String>, GuestError> {
        self.call_with_deadline(export, None)
    }

    /// Calls `export` on a blocking thread, bounded by fuel and the epoch deadline.
    pub async fn call_async(&self, export: &str) -> Result<Option<String>, GuestError> {
        let guest = self.clone();
        let name = export.to_string();
        let deadline = Duration::from_secs(self.epoch_timeout_secs);

        let engine = self.engine.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(EPOCH_TICK);
            loop {
                interval.tick().await;
                engine.increment_epoch();
            }
        });

        let result =
            tokio::task::spawn_blocking(move || guest.call_with_deadline(&name, Some(deadline)))
                .await;
        ticker.abort();

        result.map_err(|e| GuestError::Unavailable(format!("guest call task failed: {e}")))?
    }

    fn call_with_deadline(
        &self,
        export: &str,
        deadline: Option<Duration>,
    ) -> Result<Option<String>, GuestError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| GuestError::Unavailable("guest store lock poisoned".to_string()))?;
        let GuestState { store, instance } = &mut *guard;

        let func = instance
            .get_func(&mut *store, export)
            .ok_or_else(|| GuestError::MissingExport(export.to_string()))?;
        let func = func
            .typed::<(), ()>(&*store)
            .map_err(|e| GuestError::Signature {
                export: export.to_string(),
                message: e.to_string(),
            })?;

        store.data_mut().output = None;
        store
            .set_fuel(self.fuel)
            .map_err(|e| GuestError::Unavailable(format!("failed to refuel store: {e}")))?;
        store.data_mut().deadline = deadline.map(|d| Instant::now() + d);
        store.set_epoch_deadline(if deadline.is_some() { 1 } else { SYNC_EPOCH_DEADLINE });

        let result = func.call(&mut *store, ());
        store.data_mut().deadline = None;
        match result {
            Ok(()) => {
                let output = store.data_mut().output.take();
                trace!(
                    plugin_id = %self.plugin_id,
                    export,
                    output_bytes = output.as_ref().map_or(0, String::len),
                    "guest export returned"
                );
                Ok(output)
            }
            Err(e) => {
                let err = match e.downcast_ref::<Trap>() {
                    Some(Trap::OutOfFuel) => GuestError::OutOfFuel {
                        export: export.to_string(),
                        fuel: self.fuel,
                    },
                    Some(Trap::Interrupt) => GuestError::DeadlineExceeded {
                        export: export.to_string(),
                        secs: self.epoch_timeout_secs,
                    },
                    _ => GuestError::Trap {
                        export: export.to_string(),
                        message: format!("{e:#}"),
                    },
                };
                warn!(plugin_id = %self.plugin_id, export, error = %err, "guest call failed");
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for GuestInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestInstance")
            .field("plugin_id", &self.plugin_id)
            .field("fuel", &self.fuel)
            .field("epoch_timeout_secs", &self.epoch_timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Registers the `waypoint` host ABI in `linker`.
fn define_host_functions(linker: &mut Linker<HostState>) -> Result<(), WaypointError> {
    linker
        .func_wrap(
            "waypoint",
            "log",
            |mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32| {
                let Ok(msg) = read_guest_str(&mut caller, ptr, len) else {
                    return;
                };
                let plugin_id = caller.data().plugin_id.as_str();
                match level {
                    0 => trace!(target: "waypoint::guest", plugin_id, "{msg}"),
                    1 => debug!(target: "waypoint::guest", plugin_id, "{msg}"),
                    2 => info!(target: "waypoint::guest", plugin_id, "{msg}"),
                    3 => warn!(target: "waypoint::guest", plugin_id, "{msg}"),
                    _ => error!(target: "waypoint::guest", plugin_id, "{msg}"),
                }
            },
        )
        .map_err(linker_err)?;

    linker
        .func_wrap(
            "waypoint",
            "set_output",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<()> {
                let output = read_guest_str(&mut caller, ptr, len)?;
                caller.data_mut().output = Some(output);
                Ok(())
            },
        )
        .map_err(linker_err)?;

    linker
        .func_wrap(
            "waypoint",
            "has_permission",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> wasmtime::Result<i32> {
                let code = read_guest_str(&mut caller, ptr, len)?;
                Ok(i32::from(caller.data().permissions.contains(&code)))
            },
        )
        .map_err(linker_err)?;

    Ok(())
}

/// Reads a UTF-8 string out of the guest's exported memory.
fn read_guest_str(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> wasmtime::Result<String> {
    let memory = match caller.get_export("memory") {
        Some(Extern::Memory(memory)) => memory,
        _ => return Err(wasmtime::Error::msg("guest does not export memory")),
    };

    let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return Err(wasmtime::Error::msg("negative pointer or length"));
    };
    let data = memory.data(&*caller);
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| wasmtime::Error::msg("guest range out of bounds"))?;

    String::from_utf8(bytes.to_vec()).map_err(|_| wasmtime::Error::msg("guest string is not UTF-8"))
}

fn linker_err(e: wasmtime::Error) -> WaypointError {
    WaypointError::Internal(format!("failed to define host function: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_test_utils::GuestModule;

    fn host() -> ModuleHost {
        ModuleHost::new(SandboxConfig::default()).unwrap()
    }

    fn limited(fuel: u64, epoch_timeout_secs: u64) -> ModuleHost {
        ModuleHost::new(SandboxConfig {
            fuel,
            epoch_timeout_secs,
            ..SandboxConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn identical_bytes_compile_once() {
        let host = host();
        let wasm = GuestModule::new().json_export("manifest", "{}").wasm();
        host.compile("a", &wasm).unwrap();
        host.compile("b", &wasm).unwrap();
        assert_eq!(host.cached_modules(), 1);

        let other = GuestModule::new().json_export("manifest", "[]").wasm();
        host.compile("c", &other).unwrap();
        assert_eq!(host.cached_modules(), 2);
    }

    #[test]
    fn oversized_module_is_rejected() {
        let host = ModuleHost::new(SandboxConfig {
            max_module_bytes: 8,
            ..SandboxConfig::default()
        })
        .unwrap();
        let wasm = GuestModule::new().wasm();
        let err = host.compile("big", &wasm).unwrap_err();
        assert!(matches!(err, WaypointError::Module { .. }), "got {err:?}");
    }

    #[test]
    fn garbage_bytes_fail_to_compile() {
        let err = host().compile("junk", b"not wasm").unwrap_err();
        assert!(err.to_string().contains("failed to compile"));
    }

    #[test]
    fn missing_memory_is_contract_violation() {
        let wasm = wat::parse_str(r#"(module (func (export "manifest")))"#).unwrap();
        let host = host();
        let module = host.compile("bare", &wasm).unwrap();
        let err = host.instantiate("bare", &module).unwrap_err();
        assert!(matches!(err, WaypointError::Contract { .. }), "got {err:?}");
    }

    #[test]
    fn set_output_is_returned_per_call() {
        let host = host();
        let wasm = GuestModule::new()
            .json_export("routes", r#"[{"path":"/a","component":"A"}]"#)
            .func(r#"(func (export "silent"))"#)
            .wasm();
        let guest = host
            .instantiate("p", &host.compile("p", &wasm).unwrap())
            .unwrap();

        assert!(guest.has_export("routes"));
        assert!(!guest.has_export("widgets"));
        let out = guest.call("routes").unwrap().unwrap();
        assert!(out.contains("\"/a\""));
        // Output does not leak into the next call.
        assert_eq!(guest.call("silent").unwrap(), None);
        assert!(matches!(
            guest.call("widgets"),
            Err(GuestError::MissingExport(_))
        ));
    }

    #[test]
    fn has_permission_answers_from_granted_set() {
        let host = host();
        let mut module = GuestModule::new();
        let (code, code_len) = module.place("expenses.read");
        let (yes, yes_len) = module.place("\"yes\"");
        let (no, no_len) = module.place("\"no\"");
        module.func(&format!(
            r#"(func (export "check")
                (if (i32.eq (call $has_permission (i32.const {code}) (i32.const {code_len})) (i32.const 1))
                    (then (call $set_output (i32.const {yes}) (i32.const {yes_len})))
                    (else (call $set_output (i32.const {no}) (i32.const {no_len})))))"#
        ));
        let wasm = module.wasm();
        let guest = host
            .instantiate("p", &host.compile("p", &wasm).unwrap())
            .unwrap();

        assert_eq!(guest.call("check").unwrap().as_deref(), Some("\"no\""));
        guest.grant_permissions(BTreeSet::from(["expenses.read".to_string()]));
        assert_eq!(guest.call("check").unwrap().as_deref(), Some("\"yes\""));
    }

    #[test]
    fn out_of_bounds_output_traps() {
        let host = host();
        let wasm = GuestModule::new()
            .func(r#"(func (export "bad") (call $set_output (i32.const 65530) (i32.const 100)))"#)
            .wasm();
        let guest = host
            .instantiate("p", &host.compile("p", &wasm).unwrap())
            .unwrap();
        let err = guest.call("bad").unwrap_err();
        assert!(matches!(err, GuestError::Trap { .. }), "got {err:?}");
    }

    #[test]
    fn runaway_export_exhausts_fuel() {
        let host = limited(10_000, 60);
        let wasm = GuestModule::new()
            .func(r#"(func (export "spin") (loop $forever (br $forever)))"#)
            .wasm();
        let guest = host
            .instantiate("p", &host.compile("p", &wasm).unwrap())
            .unwrap();
        let err = guest.call("spin").unwrap_err();
        assert!(matches!(err, GuestError::OutOfFuel { fuel: 10_000, .. }), "got {err:?}");

        // The store is refuelled, so later calls still run.
        assert!(matches!(guest.call("spin"), Err(GuestError::OutOfFuel { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hung_hook_hits_epoch_deadline() {
        let host = limited(u64::MAX, 1);
        let wasm = GuestModule::new()
            .func(r#"(func (export "on_load") (loop $forever (br $forever)))"#)
            .wasm();
        let guest = host
            .instantiate("p", &host.compile("p", &wasm).unwrap())
            .unwrap();

        let start = std::time::Instant::now();
        let err = guest.call_async("on_load").await.unwrap_err();
        assert!(
            matches!(err, GuestError::DeadlineExceeded { secs: 1, .. }),
            "got {err:?}"
        );
        assert!(start.elapsed().as_secs() < 5, "took {:?}", start.elapsed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_hooks_each_get_the_full_deadline() {
        let host = limited(u64::MAX, 2);
        let wasm = GuestModule::new()
            .func(r#"(func (export "on_load") (loop $forever (br $forever)))"#)
            .wasm();
        let module = host.compile("p", &wasm).unwrap();
        let guests: Vec<_> = (0..4)
            .map(|i| host.instantiate(&format!("p{i}"), &module).unwrap())
            .collect();

        let start = std::time::Instant::now();
        let results =
            futures::future::join_all(guests.iter().map(|g| g.call_async("on_load"))).await;
        let elapsed = start.elapsed();

        for result in results {
            assert!(
                matches!(result, Err(GuestError::DeadlineExceeded { secs: 2, .. })),
                "got {result:?}"
            );
        }
        assert!(elapsed >= Duration::from_millis(1900), "took {elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn async_call_returns_output() {
        let host = host();
        let wasm = GuestModule::new().json_export("on_load", "true").wasm();
        let guest = host
            .instantiate("p", &host.compile("p", &wasm).unwrap())
            .unwrap();
        assert_eq!(guest.call_async("on_load").await.unwrap().as_deref(), Some("true"));
    }
}
