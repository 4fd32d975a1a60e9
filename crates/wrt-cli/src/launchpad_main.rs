//! `wrt-launchpad` - the launch daemon.
//!
//! A thin entry point around [`wrt_launchpad::daemon::bind`]. Candidates and
//! cold launches are spawned by re-executing the `wrt` binary installed next
//! to this one.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tokio::signal::unix::{SignalKind, signal};

/// WRT launchpad daemon.
#[derive(Parser)]
#[command(name = "wrt-launchpad")]
#[command(author, version, about = "WRT launchpad - pre-warmed application launcher")]
struct Args {
    /// Never keep a warm candidate; every launch is a cold spawn.
    #[arg(long)]
    no_pool: bool,

    /// Use this config file instead of the system and user layers.
    #[arg(long, env = "WRT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

/// The `wrt` binary the daemon re-executes.
fn launcher_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let dir = exe
        .parent()
        .context("own executable has no parent directory")?;
    Ok(dir.join("wrt"))
}

/// Arguments every spawned child gets before its subcommand.
fn launcher_args(config: Option<&Path>) -> Vec<String> {
    config
        .map(|path| vec!["--config".to_owned(), path.display().to_string()])
        .unwrap_or_default()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = wrt_runtime::config_bridge::load(args.config.as_deref())?.config;
    if args.no_pool {
        config.launchpad.pool_enabled = false;
    }

    let mut log_config = wrt_runtime::config_bridge::to_log_config(&config);
    if args.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = wrt_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let launcher = launcher_path()?;
    let router = wrt_launchpad::daemon::bind(
        &config,
        launcher,
        launcher_args(args.config.as_deref()),
    )?;

    let mode_label = if router.scheduler().pooling_active() {
        "warm pool"
    } else {
        "cold only"
    };
    println!(
        "{}",
        format!(
            "wrt-launchpad listening on {} (mode: {mode_label})",
            config.launchpad.launch_socket_path().display()
        )
        .cyan()
        .bold()
    );

    let mut terminate = signal(SignalKind::terminate()).context("cannot watch SIGTERM")?;
    router
        .run(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = terminate.recv() => {},
            }
            println!("\n{}", "Shutting down launchpad...".yellow());
        })
        .await?;

    println!("{}", "Launchpad stopped".green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launcher_args_forward_config() {
        assert!(launcher_args(None).is_empty());
        assert_eq!(
            launcher_args(Some(Path::new("/etc/wrt/alt.toml"))),
            vec!["--config".to_owned(), "/etc/wrt/alt.toml".to_owned()]
        );
    }

    #[test]
    fn test_launcher_is_sibling() {
        let launcher = launcher_path().unwrap();
        assert_eq!(launcher.file_name().unwrap(), "wrt");
    }
}
