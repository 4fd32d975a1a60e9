//! `wrt candidate`: a pre-warmed process spawned by the launchpad.

use wrt_config::Config;
use wrt_launchpad::{CandidateLifecycle, CandidateSettings, EXIT_BOOTSTRAP_FAILED, daemon};
use tracing::error;

/// Run the candidate lifecycle and return its exit code.
///
/// Must not be called from inside an async runtime: the entry point the
/// candidate becomes builds its own.
pub(crate) fn run_candidate(config: &Config) -> i32 {
    let groups = daemon::resource_groups(config);
    let registry = match wrt_runtime::registry(config, groups.clone()) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "entry point registry is invalid");
            return EXIT_BOOTSTRAP_FAILED;
        },
    };
    CandidateLifecycle::new(CandidateSettings::from_config(config), registry, groups).run()
}
