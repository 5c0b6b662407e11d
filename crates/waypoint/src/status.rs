// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waypoint status` command implementation.
//!
//! Bootstraps the plugin runtime the same way the host application does,
//! then reports readiness and everything loaded plugins contribute: nav
//! items, routes, widgets and any load failures.

use std::collections::BTreeMap;

use serde::Serialize;
use waypoint_core::{NavItem, RouteDef, WaypointError, WidgetDef};
use waypoint_plugin::{PluginProvider, Readiness};

use crate::Output;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub readiness: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub installed: usize,
    pub loaded: usize,
    pub nav_items: Vec<NavItem>,
    pub routes: Vec<RouteDef>,
    pub widgets: BTreeMap<String, Vec<WidgetDef>>,
    pub load_errors: Vec<LoadFailure>,
}

#[derive(Debug, Serialize)]
pub struct LoadFailure {
    pub plugin_id: String,
    pub error: String,
}

/// Bootstrap, collect a [`StatusReport`], then shut the runtime down.
pub async fn collect_status(provider: &PluginProvider) -> StatusReport {
    let readiness = provider.bootstrap().await;
    let registry = provider.registry();
    let state = registry.snapshot();

    let report = StatusReport {
        degraded_reason: match &readiness {
            Readiness::Degraded(reason) => Some(reason.clone()),
            _ => None,
        },
        readiness: readiness.to_string(),
        installed: state.plugins.len(),
        loaded: state.loaded.iter().filter(|p| p.is_loaded).count(),
        nav_items: registry.get_nav_items(),
        routes: registry.get_routes(),
        widgets: registry.get_widgets(),
        load_errors: registry
            .load_errors()
            .into_iter()
            .map(|(plugin_id, error)| LoadFailure { plugin_id, error })
            .collect(),
    };

    provider.shutdown().await;
    report
}

/// Run the `waypoint status` command.
pub async fn run_status(provider: &PluginProvider, output: Output) -> Result<(), WaypointError> {
    let report = collect_status(provider).await;
    if output.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| WaypointError::Internal(format!("failed to render status: {e}")))?;
        println!("{rendered}");
    } else {
        print!("{}", render_status(&report, output.color));
    }
    Ok(())
}

fn render_status(report: &StatusReport, color: bool) -> String {
    use colored::Colorize;

    let mut out = String::new();
    out.push('\n');
    out.push_str("  waypoint status\n");
    out.push_str(&format!("  {}\n", "-".repeat(35)));

    let state = match (&report.degraded_reason, color) {
        (None, true) => format!("{} {}", "✓".green(), report.readiness.green()),
        (None, false) => format!("[OK] {}", report.readiness),
        (Some(reason), true) => format!("{} {} ({reason})", "!".yellow(), report.readiness.yellow()),
        (Some(reason), false) => format!("[DEGRADED] {reason}"),
    };
    out.push_str(&format!("    State:    {state}\n"));
    out.push_str(&format!(
        "    Plugins:  {} installed, {} loaded\n",
        report.installed, report.loaded
    ));

    if !report.nav_items.is_empty() {
        out.push_str("\n    Navigation:\n");
        for item in &report.nav_items {
            out.push_str(&format!("      {:<20} {}\n", item.label, item.path));
        }
    }
    if !report.routes.is_empty() {
        out.push_str("\n    Routes:\n");
        for route in &report.routes {
            out.push_str(&format!("      {:<30} {}\n", route.path, route.component));
        }
    }
    for (slot, widgets) in &report.widgets {
        let ids: Vec<&str> = widgets.iter().map(|w| w.id.as_str()).collect();
        out.push_str(&format!("\n    Widgets [{slot}]: {}\n", ids.join(", ")));
    }
    if !report.load_errors.is_empty() {
        out.push_str("\n    Load errors:\n");
        for failure in &report.load_errors {
            let id = if color {
                failure.plugin_id.red().to_string()
            } else {
                failure.plugin_id.clone()
            };
            out.push_str(&format!("      {id}: {}\n", failure.error));
        }
    }
    out.push('\n');
    out
}
