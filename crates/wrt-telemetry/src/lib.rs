//! WRT Telemetry - Logging for the widget launch pipeline.
//!
//! Every WRT process (the launchpad daemon, warm candidates, cold-spawned
//! widget hosts and the client CLI) configures `tracing` through this crate so
//! that log lines carry the same shape regardless of which side of a hand-off
//! emitted them.
//!
//! # Example
//!
//! ```rust,no_run
//! use wrt_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), wrt_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("wrt_launchpad=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("launchpad starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_logging};
