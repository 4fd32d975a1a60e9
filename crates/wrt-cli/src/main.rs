//! `wrt` - launcher for WRT widget applications.
//!
//! `launch` talks to a running `wrt-launchpad`. `candidate` and `run-app`
//! are what the launchpad itself spawns; they are not meant to be typed.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod theme;

use commands::launch::{self, KindArg};
use theme::Theme;

/// WRT launcher.
#[derive(Parser)]
#[command(name = "wrt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use this config file instead of the system and user layers
    #[arg(long, global = true, env = "WRT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the launchpad to launch an application
    Launch {
        /// Application id (e.g. org.example.clock)
        app_id: String,
        /// Why the application is launched
        #[arg(short, long, value_enum, default_value = "start")]
        kind: KindArg,
        /// Argument forwarded to the application, as key=value
        #[arg(short, long = "arg", value_parser = launch::parse_key_value)]
        args: Vec<(String, String)>,
    },
    /// Run as a pre-warmed candidate (spawned by the launchpad)
    #[command(hide = true)]
    Candidate,
    /// Run one application directly (spawned by the launchpad)
    #[command(hide = true)]
    RunApp {
        /// Serialized launch request
        #[arg(long)]
        request: String,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = match wrt_runtime::config_bridge::load(cli.config.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("failed to load configuration: {e}")));
            return Err(e.into());
        },
    };

    let mut log_config = wrt_runtime::config_bridge::to_log_config(&resolved.config);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = wrt_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Launch { app_id, kind, args } => {
            let request = launch::build_request(&app_id, kind, &args)?;
            launch::run_launch(&resolved.config, &request)?;
        },
        Commands::Candidate => {
            let code = commands::candidate::run_candidate(&resolved.config);
            std::process::exit(code);
        },
        Commands::RunApp { request } => {
            let code = commands::run_app::run_app(&resolved.config, &request)?;
            std::process::exit(code);
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => {
                commands::config::show_config(&resolved, &format)?;
            },
        },
    }

    Ok(())
}
