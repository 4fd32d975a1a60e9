//! Process creation for candidates and cold launches.
//!
//! Both paths re-execute the `wrt` binary: `wrt candidate` for a warm
//! candidate, `wrt run-app --request <json>` for a cold launch. Every socket
//! the daemon holds is close-on-exec and stdin is null, so children start
//! with none of the daemon's descriptors.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use wrt_core::LaunchRequest;

/// Creates candidate and cold-launch processes for the scheduler.
pub trait ProcessSpawner {
    /// Start a new warm candidate. It registers itself on the pool socket.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the process could not be created.
    fn spawn_candidate(&mut self) -> std::io::Result<Pid>;

    /// Start a process that runs `request` directly.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the process could not be created.
    fn spawn_cold(&mut self, request: &LaunchRequest) -> std::io::Result<Pid>;
}

/// Exit notification for a process started by a [`CommandSpawner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    /// The process that exited.
    pub pid: Pid,
    /// Exit code, `None` when killed by a signal.
    pub code: Option<i32>,
}

/// Spawner that re-executes a launcher binary through `tokio::process`.
///
/// Each child is awaited on a background task that reports a [`ChildExit`]
/// to the router, which is how a candidate dying before registration is
/// noticed.
#[derive(Debug)]
pub struct CommandSpawner {
    program: PathBuf,
    base_args: Vec<OsString>,
    exits: mpsc::UnboundedSender<ChildExit>,
}

impl CommandSpawner {
    /// Create a spawner for `program`. Exits are sent on `exits`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, exits: mpsc::UnboundedSender<ChildExit>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            exits,
        }
    }

    /// Arguments placed before the subcommand, e.g. `--config <path>`.
    #[must_use]
    pub fn with_base_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.base_args.extend(args.into_iter().map(Into::into));
        self
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .arg(subcommand)
            .stdin(Stdio::null())
            .kill_on_drop(false);
        cmd
    }

    fn track(&self, mut child: Child) -> std::io::Result<Pid> {
        let raw = child
            .id()
            .and_then(|id| i32::try_from(id).ok())
            .ok_or_else(|| std::io::Error::other("spawned child has no pid"))?;
        let pid = Pid::from_raw(raw);
        let exits = self.exits.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(pid = raw, error = %e, "failed to wait for child");
                    None
                },
            };
            debug!(pid = raw, ?code, "child exited");
            // The router may already be gone during shutdown.
            let _ = exits.send(ChildExit { pid, code });
        });
        Ok(pid)
    }
}

impl ProcessSpawner for CommandSpawner {
    fn spawn_candidate(&mut self) -> std::io::Result<Pid> {
        let child = self.command("candidate").spawn()?;
        self.track(child)
    }

    fn spawn_cold(&mut self, request: &LaunchRequest) -> std::io::Result<Pid> {
        let payload = request.to_json().map_err(std::io::Error::other)?;
        let payload = String::from_utf8(payload).map_err(std::io::Error::other)?;
        let child = self
            .command("run-app")
            .arg("--request")
            .arg(payload)
            .spawn()?;
        self.track(child)
    }
}
