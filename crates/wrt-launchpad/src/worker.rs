//! The dependent worker process a candidate starts next to itself.
//!
//! A [`WorkerProcess`] is killed and reaped when it is dropped, so a launch
//! that fails anywhere between bootstrap and hide never leaves the worker
//! behind.

use std::process::{Child, Command, Stdio};

use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::{LaunchpadError, LaunchpadResult};

/// Owned handle to a running worker process.
#[derive(Debug)]
pub struct WorkerProcess {
    pid: Pid,
    child: Option<Child>,
}

impl WorkerProcess {
    /// Start `command` (program followed by its arguments) with a null stdin.
    /// An empty command starts nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchpadError::Spawn`] if the process could not be created.
    pub fn spawn(command: &[String]) -> LaunchpadResult<Option<Self>> {
        let Some((program, args)) = command.split_first() else {
            return Ok(None);
        };
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(LaunchpadError::Spawn)?;
        let id = child.id();
        // Owned before the pid check so a failure still kills the child.
        let mut worker = Self {
            pid: Pid::from_raw(0),
            child: Some(child),
        };
        let raw = i32::try_from(id).map_err(|e| LaunchpadError::Spawn(std::io::Error::other(e)))?;
        worker.pid = Pid::from_raw(raw);
        debug!(worker_pid = raw, %program, "worker started");
        Ok(Some(worker))
    }

    /// Worker pid.
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Kill the worker and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the worker could not be signalled or reaped.
    pub fn stop(mut self) -> std::io::Result<()> {
        self.terminate()
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_none() {
            child.kill()?;
        }
        let status = child.wait()?;
        debug!(worker_pid = self.pid.as_raw(), ?status, "worker stopped");
        Ok(())
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!(worker_pid = self.pid.as_raw(), error = %e, "failed to stop worker process");
        }
    }
}
