// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of the plugin-management backend.

pub mod client;

pub use client::HttpPluginBackend;
