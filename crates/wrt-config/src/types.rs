//! Configuration types for the WRT launch pipeline.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal wrt crates. Every struct implements [`Default`] with the same
//! values as the embedded `defaults.toml`, so a bare `[section]` header in
//! TOML produces a working configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration for the launchpad daemon and the processes it starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daemon sockets, pooling switch and scheduling timeouts.
    pub launchpad: LaunchpadSection,
    /// Warm candidate bootstrap settings.
    pub candidate: CandidateSection,
    /// First-render status reporting timers.
    pub reporter: ReporterSection,
    /// Widget host settings.
    pub runtime: RuntimeSection,
    /// Foreground/background resource group placement.
    pub resource_groups: ResourceGroupsSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// Launchpad
// ---------------------------------------------------------------------------

/// Launchpad daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchpadSection {
    /// Keep a warm candidate process around for hand-off.
    pub pool_enabled: bool,
    /// Launch-request socket. Defaults to `<runtime dir>/wrt/launch.sock`.
    pub launch_socket: Option<PathBuf>,
    /// Pool-registration socket. Defaults to `<runtime dir>/wrt/pool.sock`.
    pub pool_socket: Option<PathBuf>,
    /// Upper bound on blocking reads of a launch packet or registration.
    pub request_timeout_ms: u64,
    /// How long a handed-off candidate may hold the pool slot without
    /// reporting `Finished` before a replacement is spawned anyway.
    pub replenish_fallback_ms: u64,
    /// Delay before spawning a replacement after a candidate is reaped.
    pub respawn_delay_ms: u64,
}

impl Default for LaunchpadSection {
    fn default() -> Self {
        Self {
            pool_enabled: true,
            launch_socket: None,
            pool_socket: None,
            request_timeout_ms: 1000,
            replenish_fallback_ms: 10_000,
            respawn_delay_ms: 1000,
        }
    }
}

impl LaunchpadSection {
    /// Resolved launch-request socket path.
    #[must_use]
    pub fn launch_socket_path(&self) -> PathBuf {
        self.launch_socket
            .clone()
            .unwrap_or_else(|| socket_dir().join("launch.sock"))
    }

    /// Resolved pool-registration socket path.
    #[must_use]
    pub fn pool_socket_path(&self) -> PathBuf {
        self.pool_socket
            .clone()
            .unwrap_or_else(|| socket_dir().join("pool.sock"))
    }

    /// Read timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Replenishment fallback as a [`Duration`].
    #[must_use]
    pub fn replenish_fallback(&self) -> Duration {
        Duration::from_millis(self.replenish_fallback_ms)
    }

    /// Respawn delay as a [`Duration`].
    #[must_use]
    pub fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn_delay_ms)
    }
}

/// Directory holding the daemon sockets.
///
/// Prefers the XDG runtime directory and falls back to the system temp dir.
fn socket_dir() -> PathBuf {
    directories::BaseDirs::new()
        .and_then(|d| d.runtime_dir().map(std::path::Path::to_path_buf))
        .unwrap_or_else(std::env::temp_dir)
        .join("wrt")
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// Warm candidate bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateSection {
    /// Nice value applied while the candidate waits for a hand-off.
    pub nice: i32,
    /// Optional dependent worker process started by each candidate
    /// (program followed by its arguments). Empty means no worker.
    pub worker_command: Vec<String>,
    /// Entry point used when a hand-off does not name one.
    pub default_entry_point: String,
}

impl Default for CandidateSection {
    fn default() -> Self {
        Self {
            nice: 10,
            worker_command: Vec::new(),
            default_entry_point: "widget-host".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Launch status reporter timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterSection {
    /// Report `Delayed` if no frame was rendered within this window.
    pub delayed_timer_ms: u64,
    /// Report `Finished` this long after the first frame.
    pub finished_timer_ms: u64,
}

impl Default for ReporterSection {
    fn default() -> Self {
        Self {
            delayed_timer_ms: 5000,
            finished_timer_ms: 350,
        }
    }
}

impl ReporterSection {
    /// Delayed timer as a [`Duration`].
    #[must_use]
    pub fn delayed_timer(&self) -> Duration {
        Duration::from_millis(self.delayed_timer_ms)
    }

    /// Finished timer as a [`Duration`].
    #[must_use]
    pub fn finished_timer(&self) -> Duration {
        Duration::from_millis(self.finished_timer_ms)
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Widget host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    /// Delay between the first rendered frame and presenting the window.
    pub display_delay_ms: u64,
    /// Root directory of installed widgets.
    pub widget_root: PathBuf,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            display_delay_ms: 100,
            widget_root: PathBuf::from("/opt/widgets"),
        }
    }
}

impl RuntimeSection {
    /// Display delay as a [`Duration`].
    #[must_use]
    pub fn display_delay(&self) -> Duration {
        Duration::from_millis(self.display_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Resource groups
// ---------------------------------------------------------------------------

/// cgroup placement for foreground and background processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceGroupsSection {
    /// Write process ids into cgroup directories. When disabled, group moves
    /// are only logged.
    pub enabled: bool,
    /// Parent cgroup directory.
    pub cgroup_root: PathBuf,
    /// Child cgroup for foreground processes.
    pub foreground: String,
    /// Child cgroup for background processes.
    pub background: String,
}

impl Default for ResourceGroupsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            cgroup_root: PathBuf::from("/sys/fs/cgroup/wrt"),
            foreground: "foreground".to_owned(),
            background: "background".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Output format (`pretty`, `compact`, `json`).
    pub format: String,
    /// Per-target directives such as `wrt_launchpad=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}
