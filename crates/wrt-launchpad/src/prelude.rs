//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wrt_launchpad::prelude::*;` to import all essential types.

pub use crate::{LaunchpadError, LaunchpadResult};

pub use crate::{
    CandidateLifecycle, CandidateSettings, EntryPoint, EntryPointRegistry, LaunchContext,
    LaunchOrigin, WorkerProcess,
};

pub use crate::{
    LaunchRequestRouter, PoolSettings, ProcessPoolScheduler, ProcessSpawner, RouterSettings,
};

pub use crate::{LaunchStatusReporter, ReporterTimers, StatusSink};
