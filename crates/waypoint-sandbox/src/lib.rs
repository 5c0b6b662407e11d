// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WASM sandbox for plugin frontend modules.
//!
//! [`ModuleHost`] owns the wasmtime engine and the compiled-module cache;
//! [`WasmModuleImporter`] fetches modules over HTTP and turns their exports
//! into [`waypoint_core::PluginExports`].

pub mod importer;
pub mod runtime;

pub use importer::{WasmModuleImporter, exports_from_bytes};
pub use runtime::{GuestError, GuestInstance, ModuleHost};
