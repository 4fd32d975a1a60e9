//! Subcommand implementations for `wrt`.

pub(crate) mod candidate;
pub(crate) mod config;
pub(crate) mod launch;
pub(crate) mod run_app;
