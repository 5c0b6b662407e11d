// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `waypoint plugins` command implementations.

use std::path::Path;

use serde::Serialize;
use waypoint_core::{DiscoveredPlugin, PluginSummary, WaypointError};
use waypoint_plugin::PluginRegistry;

use crate::{Output, PluginCommands};

/// Run one `plugins` subcommand against the registry.
pub async fn run_plugins(
    registry: &PluginRegistry,
    command: PluginCommands,
    output: Output,
) -> Result<(), WaypointError> {
    match command {
        PluginCommands::List => {
            let plugins = registry.fetch_plugins().await?;
            if output.json {
                print_json(&plugins);
            } else {
                print!("{}", render_installed(&plugins, output.color));
            }
        }
        PluginCommands::Discovered => {
            registry.fetch_plugins().await?;
            let discovered = registry.fetch_discovered_plugins().await;
            if output.json {
                print_json(&discovered);
            } else {
                print!("{}", render_discovered(&discovered));
            }
        }
        PluginCommands::Info { plugin_id } => {
            let info = registry.get_plugin_info(&plugin_id).await?;
            print_json(&info);
        }
        PluginCommands::Install { package } => {
            let (file_name, bytes) = read_package(&package).await?;
            let response = registry.install_plugin(&file_name, bytes).await?;
            report(output, &response, &format!("installed {}", response.plugin_id));
        }
        PluginCommands::InstallDiscovered { plugin_id } => {
            let response = registry.install_discovered_plugin(&plugin_id).await?;
            report(output, &response, &format!("installed {plugin_id}"));
        }
        PluginCommands::Uninstall {
            plugin_id,
            drop_tables,
            remove_permissions,
        } => {
            let result = registry
                .uninstall_plugin(&plugin_id, drop_tables, remove_permissions)
                .await?;
            report(output, &result, &format!("uninstalled {plugin_id}"));
        }
        PluginCommands::Enable { plugin_id } => {
            let result = registry.enable_plugin(&plugin_id).await?;
            let load_error = registry
                .snapshot()
                .loaded_plugin(&plugin_id)
                .and_then(|p| p.load_error.clone());
            // Tear the frontend down again so its onUnload hook runs before exit.
            registry.reset().await;
            report(output, &result, &format!("enabled {plugin_id}"));
            if let Some(error) = load_error {
                eprintln!("warning: {plugin_id} is enabled but its frontend failed to load: {error}");
            }
        }
        PluginCommands::Disable { plugin_id } => {
            let result = registry.disable_plugin(&plugin_id).await?;
            report(output, &result, &format!("disabled {plugin_id}"));
        }
        PluginCommands::Settings {
            plugin_id,
            settings,
        } => {
            let settings = parse_settings(&settings)?;
            let result = registry.update_settings(&plugin_id, settings).await?;
            report(output, &result, &format!("updated settings for {plugin_id}"));
        }
    }
    Ok(())
}

/// Read a package file, keeping only its file name for the upload.
async fn read_package(path: &Path) -> Result<(String, Vec<u8>), WaypointError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            WaypointError::Config(format!("'{}' is not a package file", path.display()))
        })?
        .to_string();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        WaypointError::Config(format!("failed to read package '{}': {e}", path.display()))
    })?;
    Ok((file_name, bytes))
}

/// Settings must be a JSON object.
fn parse_settings(raw: &str) -> Result<serde_json::Value, WaypointError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| WaypointError::Config(format!("settings are not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(WaypointError::Config(
            "settings must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn report<T: Serialize>(output: Output, value: &T, summary: &str) {
    if output.json {
        print_json(value);
    } else if output.color {
        use colored::Colorize;
        println!("{} {summary}", "✓".green());
    } else {
        println!("[OK] {summary}");
    }
}

fn render_installed(plugins: &[PluginSummary], color: bool) -> String {
    if plugins.is_empty() {
        return "no plugins installed\n".to_string();
    }
    let width = plugins
        .iter()
        .map(|p| p.plugin_id.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for plugin in plugins {
        let state = match (plugin.enabled, color) {
            (true, true) => {
                use colored::Colorize;
                "enabled ".green().to_string()
            }
            (false, true) => {
                use colored::Colorize;
                "disabled".yellow().to_string()
            }
            (true, false) => "enabled ".to_string(),
            (false, false) => "disabled".to_string(),
        };
        let mut parts = Vec::new();
        if plugin.has_frontend {
            parts.push("frontend");
        }
        if plugin.has_backend {
            parts.push("backend");
        }
        out.push_str(&format!(
            "  {:<width$}  {:<10}  {state}  {}\n",
            plugin.plugin_id,
            plugin.plugin_version,
            parts.join("+"),
        ));
    }
    out
}

fn render_discovered(discovered: &[DiscoveredPlugin]) -> String {
    if discovered.is_empty() {
        return "no uninstalled plugins found\n".to_string();
    }
    discovered
        .iter()
        .map(|p| {
            let name = p
                .manifest
                .as_ref()
                .map(|m| m.name.as_str())
                .unwrap_or("(no manifest)");
            format!("  {} {}  {name}\n", p.plugin_id, p.plugin_version)
        })
        .collect()
}
