//! Daemon assembly: configuration in, running router out.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use wrt_config::Config;
use wrt_core::{CgroupBackend, ResourceGroupManager};

use crate::error::LaunchpadResult;
use crate::router::{LaunchRequestRouter, RouterSettings};
use crate::scheduler::{PoolSettings, ProcessPoolScheduler};
use crate::spawner::CommandSpawner;

/// Build the resource group manager described by the configuration.
///
/// When cgroup placement is enabled but the group directories cannot be
/// created, moves degrade to logging.
#[must_use]
pub fn resource_groups(config: &Config) -> ResourceGroupManager {
    let section = &config.resource_groups;
    if !section.enabled {
        return ResourceGroupManager::disabled();
    }
    let backend = CgroupBackend::new(
        &section.cgroup_root,
        &section.foreground,
        &section.background,
    );
    match backend.ensure_groups() {
        Ok(()) => ResourceGroupManager::new(Arc::new(backend)),
        Err(e) => {
            warn!(
                root = %section.cgroup_root.display(),
                error = %e,
                "cgroup groups unavailable, placement disabled"
            );
            ResourceGroupManager::disabled()
        },
    }
}

/// Pool settings from the configuration.
#[must_use]
pub fn pool_settings(config: &Config) -> PoolSettings {
    PoolSettings {
        enabled: config.launchpad.pool_enabled,
        replenish_fallback: config.launchpad.replenish_fallback(),
        respawn_delay: config.launchpad.respawn_delay(),
        send_timeout: config.launchpad.request_timeout(),
    }
}

/// Router settings from the configuration.
#[must_use]
pub fn router_settings(config: &Config) -> RouterSettings {
    RouterSettings {
        launch_socket: config.launchpad.launch_socket_path(),
        pool_socket: config
            .launchpad
            .pool_enabled
            .then(|| config.launchpad.pool_socket_path()),
        request_timeout: config.launchpad.request_timeout(),
    }
}

/// Bind a daemon whose candidates and cold launches run `launcher`.
///
/// `launcher_args` are passed before the subcommand of every child, so a
/// custom `--config` reaches them too.
///
/// # Errors
///
/// Returns an error if the launch socket cannot be bound.
pub fn bind(
    config: &Config,
    launcher: PathBuf,
    launcher_args: Vec<String>,
) -> LaunchpadResult<LaunchRequestRouter<CommandSpawner>> {
    let (exits_tx, exits_rx) = mpsc::unbounded_channel();
    let spawner = CommandSpawner::new(launcher, exits_tx).with_base_args(launcher_args);
    let scheduler = ProcessPoolScheduler::new(pool_settings(config), spawner, resource_groups(config));
    let router = LaunchRequestRouter::bind(&router_settings(config), scheduler, exits_rx)?;
    info!(
        pooling = router.scheduler().pooling_active(),
        "launchpad ready"
    );
    Ok(router)
}
