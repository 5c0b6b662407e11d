// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the runtime and its external collaborators.

pub mod backend;
pub mod importer;

pub use backend::PluginBackend;
pub use importer::ModuleImporter;
