//! Foreground/background resource groups.
//!
//! A launched widget and its worker process sit in the foreground group while
//! visible and in the background group while idle or suspended. Membership is
//! written by the launchpad at hand-off and by the widget process itself at
//! suspend/resume; the two never race for the same pid, so a move is a plain
//! "write these pids" operation with no locking.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// The two scheduling groups a widget process can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceGroup {
    /// Visible, interactive processes.
    Foreground,
    /// Warm candidates and suspended widgets.
    Background,
}

impl fmt::Display for ResourceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Foreground => "foreground",
            Self::Background => "background",
        })
    }
}

/// Mechanism that places a single process into a group.
pub trait ResourceGroupBackend: Send + Sync + fmt::Debug {
    /// Move `pid` into `group`.
    ///
    /// # Errors
    ///
    /// Returns an error if the placement was rejected.
    fn assign(&self, group: ResourceGroup, pid: Pid) -> CoreResult<()>;
}

/// cgroup v2 backend: writes pids into `<root>/<group>/cgroup.procs`.
#[derive(Debug, Clone)]
pub struct CgroupBackend {
    root: PathBuf,
    foreground: String,
    background: String,
}

impl CgroupBackend {
    /// Create a backend rooted at `root` with the given child group names.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        foreground: impl Into<String>,
        background: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            foreground: foreground.into(),
            background: background.into(),
        }
    }

    /// Create both group directories if they are missing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be created.
    pub fn ensure_groups(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.group_dir(ResourceGroup::Foreground))?;
        std::fs::create_dir_all(self.group_dir(ResourceGroup::Background))?;
        Ok(())
    }

    /// Directory of a group.
    #[must_use]
    pub fn group_dir(&self, group: ResourceGroup) -> PathBuf {
        match group {
            ResourceGroup::Foreground => self.root.join(&self.foreground),
            ResourceGroup::Background => self.root.join(&self.background),
        }
    }

    fn procs_file(&self, group: ResourceGroup) -> PathBuf {
        self.group_dir(group).join("cgroup.procs")
    }
}

impl ResourceGroupBackend for CgroupBackend {
    fn assign(&self, group: ResourceGroup, pid: Pid) -> CoreResult<()> {
        let path = self.procs_file(group);
        write_pid(&path, pid).map_err(|source| CoreError::ResourceGroup {
            pid: pid.as_raw(),
            group,
            path,
            source,
        })
    }
}

/// One pid per write, as the cgroup interface requires.
fn write_pid(path: &Path, pid: Pid) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(format!("{pid}\n").as_bytes())
}

/// Backend used when resource groups are disabled: moves are only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBackend;

impl ResourceGroupBackend for LoggingBackend {
    fn assign(&self, group: ResourceGroup, pid: Pid) -> CoreResult<()> {
        debug!(pid = pid.as_raw(), %group, "resource groups disabled, skipping move");
        Ok(())
    }
}

/// Moves a process and its optional worker between groups.
#[derive(Debug, Clone)]
pub struct ResourceGroupManager {
    backend: Arc<dyn ResourceGroupBackend>,
}

impl ResourceGroupManager {
    /// Create a manager over an arbitrary backend.
    #[must_use]
    pub fn new(backend: Arc<dyn ResourceGroupBackend>) -> Self {
        Self { backend }
    }

    /// A manager that never touches the system.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Arc::new(LoggingBackend))
    }

    /// Move `pid` and then `worker` into `group`.
    ///
    /// Both moves are attempted even if the first fails; the first error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first placement error.
    pub fn move_to(&self, group: ResourceGroup, pid: Pid, worker: Option<Pid>) -> CoreResult<()> {
        let owner_result = self.backend.assign(group, pid);
        let worker_result = worker.map_or(Ok(()), |w| self.backend.assign(group, w));
        debug!(pid = pid.as_raw(), worker = ?worker.map(Pid::as_raw), %group, "moved process group");
        owner_result.and(worker_result)
    }

    /// Move into the foreground group.
    ///
    /// # Errors
    ///
    /// Returns the first placement error.
    pub fn to_foreground(&self, pid: Pid, worker: Option<Pid>) -> CoreResult<()> {
        self.move_to(ResourceGroup::Foreground, pid, worker)
    }

    /// Move into the background group.
    ///
    /// # Errors
    ///
    /// Returns the first placement error.
    pub fn to_background(&self, pid: Pid, worker: Option<Pid>) -> CoreResult<()> {
        self.move_to(ResourceGroup::Background, pid, worker)
    }

    /// Like [`move_to`](Self::move_to) but only logs failures.
    pub fn move_best_effort(&self, group: ResourceGroup, pid: Pid, worker: Option<Pid>) {
        if let Err(e) = self.move_to(group, pid, worker) {
            warn!(pid = pid.as_raw(), %group, error = %e, "resource group move failed");
        }
    }
}

impl Default for ResourceGroupManager {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cgroup_backend_writes_owner_and_worker() {
        let dir = tempfile::tempdir().unwrap();
        let backend = CgroupBackend::new(dir.path(), "fg", "bg");
        backend.ensure_groups().unwrap();
        let manager = ResourceGroupManager::new(Arc::new(backend.clone()));

        manager
            .to_foreground(Pid::from_raw(100), Some(Pid::from_raw(200)))
            .unwrap();

        let procs =
            std::fs::read_to_string(backend.group_dir(ResourceGroup::Foreground).join("cgroup.procs"))
                .unwrap();
        assert_eq!(procs, "100\n200\n");
        assert!(
            !backend
                .group_dir(ResourceGroup::Background)
                .join("cgroup.procs")
                .exists()
        );
    }

    #[test]
    fn test_missing_group_dir_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ResourceGroupManager::new(Arc::new(CgroupBackend::new(dir.path().join("absent"), "fg", "bg")));

        let err = manager.to_background(Pid::from_raw(7), None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ResourceGroup {
                pid: 7,
                group: ResourceGroup::Background,
                ..
            }
        ));
    }

    #[test]
    fn test_worker_move_attempted_after_owner_failure() {
        #[derive(Debug, Default)]
        struct Recording(std::sync::Mutex<Vec<i32>>);
        impl ResourceGroupBackend for Recording {
            fn assign(&self, group: ResourceGroup, pid: Pid) -> CoreResult<()> {
                self.0.lock().unwrap().push(pid.as_raw());
                if pid.as_raw() == 1 {
                    return Err(CoreError::ResourceGroup {
                        pid: 1,
                        group,
                        path: PathBuf::from("/dev/null"),
                        source: std::io::Error::other("denied"),
                    });
                }
                Ok(())
            }
        }

        let backend = Arc::new(Recording::default());
        let manager = ResourceGroupManager::new(Arc::clone(&backend) as Arc<dyn ResourceGroupBackend>);
        assert!(manager.to_foreground(Pid::from_raw(1), Some(Pid::from_raw(2))).is_err());
        assert_eq!(*backend.0.lock().unwrap(), vec![1, 2]);
    }
}
