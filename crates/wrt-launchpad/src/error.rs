//! Launch scheduling error types.

use thiserror::Error;

use wrt_core::CoreError;

/// Errors raised by the launch scheduling layer.
///
/// Scheduler-side faults are logged and recovered inside the daemon; only
/// [`LaunchpadError::Spawn`] ever reaches a launch caller (as a negative reply).
#[derive(Debug, Error)]
pub enum LaunchpadError {
    /// Malformed registration, failed accept/connect, or a broken candidate
    /// socket. The scheduler degrades to cold spawning.
    #[error("Pool protocol error: {0}")]
    PoolProtocol(String),

    /// A launch packet could not be decoded.
    #[error("Malformed launch packet: {0}")]
    MalformedPacket(String),

    /// Creating a process failed.
    #[error("Failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),

    /// No entry point is registered under the requested name.
    #[error("Unknown entry point: {0}")]
    UnknownEntryPoint(String),

    /// An entry point with the same name is already registered.
    #[error("Entry point already registered: {0}")]
    DuplicateEntryPoint(String),

    /// The daemon answered a launch request with an error code.
    #[error("Launch rejected by launchpad (code {0})")]
    LaunchRejected(i32),

    /// A blocking step did not finish in time.
    #[error("Timed out while {0}")]
    Timeout(&'static str),

    /// Shared type error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for launchpad operations.
pub type LaunchpadResult<T> = Result<T, LaunchpadError>;
