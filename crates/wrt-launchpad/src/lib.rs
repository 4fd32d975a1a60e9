//! WRT Launchpad - warm-pool launch scheduling.
//!
//! The launchpad daemon keeps one partially initialized "candidate" process
//! parked on a Unix socket. A launch request is handed to that candidate,
//! which then turns into the requested application in-process; when no
//! candidate is idle the daemon spawns a fresh process instead.
//!
//! # Pieces
//!
//! - [`protocol`]: registration record, candidate channel and launch packet
//!   formats.
//! - [`scheduler::ProcessPoolScheduler`]: candidate bookkeeping, dispatch,
//!   reaping and replenishment.
//! - [`router::LaunchRequestRouter`]: the single-threaded daemon loop.
//! - [`candidate::CandidateLifecycle`]: what runs inside a candidate.
//! - [`reporter::LaunchStatusReporter`]: first-render status timers used by
//!   launched applications.
//! - [`entry`]: the [`EntryPoint`] trait and its registry.
//! - [`worker::WorkerProcess`]: the candidate's worker, killed on drop.
//!
//! # Example
//!
//! ```rust,no_run
//! use wrt_config::Config;
//! use wrt_launchpad::daemon;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?.config;
//! let router = daemon::bind(&config, "/usr/bin/wrt".into(), Vec::new())?;
//! router.run(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod candidate;
pub mod client;
pub mod daemon;
pub mod entry;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod reporter;
pub mod router;
pub mod scheduler;
pub mod spawner;
pub mod worker;

pub use candidate::{CandidateLifecycle, CandidateSettings, EXIT_BOOTSTRAP_FAILED};
pub use client::request_launch;
pub use entry::{EntryPoint, EntryPointRegistry, LaunchContext, LaunchOrigin};
pub use error::{LaunchpadError, LaunchpadResult};
pub use reporter::{LaunchStatusReporter, ReportPhase, ReporterTimers, StatusSink};
pub use router::{LaunchRequestRouter, RouterSettings};
pub use scheduler::{
    CandidateEvent, CandidateProcess, CandidateStatus, PoolSettings, ProcessPoolScheduler,
};
pub use spawner::{ChildExit, CommandSpawner, ProcessSpawner};
pub use worker::WorkerProcess;
