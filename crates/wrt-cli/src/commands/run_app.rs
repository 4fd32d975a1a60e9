//! `wrt run-app`: the cold path, used when no warm candidate was available.

use anyhow::{Context, Result};
use tracing::info;
use wrt_config::Config;
use wrt_core::LaunchRequest;
use wrt_launchpad::{LaunchContext, daemon};

/// Parse the request, resolve its entry point and run it.
///
/// Returns the entry point's exit code.
pub(crate) fn run_app(config: &Config, request_json: &str) -> Result<i32> {
    let request = LaunchRequest::from_json(request_json.as_bytes())
        .context("invalid --request payload")?;
    let registry = wrt_runtime::registry(config, daemon::resource_groups(config))?;
    let entry = registry.resolve(&request)?;
    info!(
        entry_point = entry.name(),
        app_id = %request.app_id,
        "cold launch"
    );
    Ok(entry.run(LaunchContext::cold(request)))
}
