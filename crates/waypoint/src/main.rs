// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Waypoint - operator CLI for the plugin runtime.
//!
//! Talks to the plugin-management backend, bootstraps plugin frontends in
//! the WASM sandbox and prints what they contribute to the host.

mod app;
mod plugins;
mod status;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use waypoint_config::WaypointConfig;
use waypoint_core::WaypointError;

/// Waypoint - plugin runtime for the travel and expense host.
#[derive(Parser, Debug)]
#[command(name = "waypoint", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colors.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage installed plugins.
    #[command(subcommand)]
    Plugins(PluginCommands),
    /// Bootstrap all plugins and report what they contribute.
    Status,
    /// Print the effective configuration.
    Config,
}

/// `waypoint plugins` subcommands.
#[derive(Subcommand, Debug, PartialEq)]
pub(crate) enum PluginCommands {
    /// List installed plugins.
    List,
    /// List plugins found in backend storage but not installed.
    Discovered,
    /// Show backend details for one plugin.
    Info { plugin_id: String },
    /// Upload and install a plugin package (.zip).
    Install { package: PathBuf },
    /// Install a discovered plugin.
    InstallDiscovered { plugin_id: String },
    /// Uninstall a plugin.
    Uninstall {
        plugin_id: String,
        /// Also drop the plugin's database tables.
        #[arg(long)]
        drop_tables: bool,
        /// Also remove the permissions the plugin provided.
        #[arg(long)]
        remove_permissions: bool,
    },
    /// Enable a plugin and load its frontend.
    Enable { plugin_id: String },
    /// Unload a plugin's frontend and disable it.
    Disable { plugin_id: String },
    /// Replace a plugin's settings with a JSON object.
    Settings { plugin_id: String, settings: String },
}

/// How command output should be rendered.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Output {
    pub json: bool,
    pub color: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            waypoint_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.host.log_level);

    let output = Output {
        json: cli.json,
        color: !cli.plain && std::io::stdout().is_terminal(),
    };

    if let Err(e) = run(cli.command, &config, output).await {
        if output.color {
            use colored::Colorize;
            eprintln!("{} {e}", "error:".red().bold());
        } else {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<WaypointConfig, Vec<waypoint_config::ConfigError>> {
    match path {
        Some(path) => waypoint_config::load_and_validate_path(path),
        None => waypoint_config::load_and_validate(),
    }
}

async fn run(
    command: Option<Commands>,
    config: &WaypointConfig,
    output: Output,
) -> Result<(), WaypointError> {
    match command {
        Some(Commands::Plugins(command)) => {
            let registry = app::build_registry(config)?;
            plugins::run_plugins(&registry, command, output).await
        }
        Some(Commands::Status) => {
            let provider = app::build_provider(config)?;
            status::run_status(&provider, output).await
        }
        Some(Commands::Config) => {
            let rendered = config
                .to_redacted_toml()
                .map_err(|e| WaypointError::Internal(format!("failed to render config: {e}")))?;
            print!("{rendered}");
            Ok(())
        }
        None => {
            println!("waypoint: use --help for available commands");
            Ok(())
        }
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `host.log_level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("waypoint={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
