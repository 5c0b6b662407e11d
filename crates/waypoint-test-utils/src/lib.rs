// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Waypoint integration tests.
//!
//! Provides in-memory stand-ins for the plugin backend and the module
//! importer, plus a builder for small guest modules, so registry and loader
//! behavior can be tested without a server or real plugin bundles.
//!
//! # Components
//!
//! - [`MockBackend`] - in-memory plugin-management backend
//! - [`MockImporter`] - scripted module importer with call counters
//! - [`GuestModule`] - WAT builder for guest modules speaking the host ABI
//! - [`CallLog`] - ordered record shared between mocks

pub mod call_log;
pub mod fixtures;
pub mod guest_module;
pub mod mock_backend;
pub mod mock_importer;

pub use call_log::CallLog;
pub use guest_module::GuestModule;
pub use mock_backend::MockBackend;
pub use mock_importer::{HookScript, MockImporter, MockModule};
