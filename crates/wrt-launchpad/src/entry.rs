//! Application entry points.
//!
//! A candidate process is already running when it learns which application
//! it will become, so applications are not separate executables: they are
//! [`EntryPoint`] implementations compiled into the launcher and selected by
//! name at hand-off time.

use std::collections::BTreeMap;
use std::fmt;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use nix::unistd::Pid;

use wrt_core::LaunchRequest;

use crate::error::{LaunchpadError, LaunchpadResult};
use crate::worker::WorkerProcess;

/// How the process running an entry point was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOrigin {
    /// A warm candidate received the request from the daemon.
    HandOff,
    /// The daemon spawned a fresh process for the request.
    Cold,
}

/// Everything an entry point receives from the launcher.
#[derive(Debug)]
pub struct LaunchContext {
    /// The request being served.
    pub request: LaunchRequest,
    /// How this process was created.
    pub origin: LaunchOrigin,
    /// Status channel back to the daemon. Only present after a hand-off.
    pub status: Option<UnixStream>,
    /// Dependent worker process started by the candidate. Killed when
    /// dropped.
    pub worker: Option<WorkerProcess>,
}

impl LaunchContext {
    /// Context for a request handed off to a warm candidate.
    #[must_use]
    pub fn handed_off(
        request: LaunchRequest,
        status: UnixStream,
        worker: Option<WorkerProcess>,
    ) -> Self {
        Self {
            request,
            origin: LaunchOrigin::HandOff,
            status: Some(status),
            worker,
        }
    }

    /// Context for a cold launch.
    #[must_use]
    pub fn cold(request: LaunchRequest) -> Self {
        Self {
            request,
            origin: LaunchOrigin::Cold,
            status: None,
            worker: None,
        }
    }

    /// Pid of the worker process, if any.
    #[must_use]
    pub fn worker_pid(&self) -> Option<Pid> {
        self.worker.as_ref().map(WorkerProcess::pid)
    }
}

/// An application that can run inside a launcher process.
pub trait EntryPoint: Send + Sync {
    /// Name used to select this entry point.
    fn name(&self) -> &str;

    /// Run the application to completion and return the process exit code.
    fn run(&self, ctx: LaunchContext) -> i32;
}

/// Named entry points plus the default used when a request names none.
#[derive(Clone)]
pub struct EntryPointRegistry {
    entries: BTreeMap<String, Arc<dyn EntryPoint>>,
    default_name: String,
}

impl fmt::Debug for EntryPointRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPointRegistry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("default_name", &self.default_name)
            .finish()
    }
}

impl EntryPointRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            entries: BTreeMap::new(),
            default_name: default_name.into(),
        }
    }

    /// Add an entry point.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchpadError::DuplicateEntryPoint`] if the name is taken.
    pub fn register(&mut self, entry: Arc<dyn EntryPoint>) -> LaunchpadResult<()> {
        let name = entry.name().to_owned();
        if self.entries.contains_key(&name) {
            return Err(LaunchpadError::DuplicateEntryPoint(name));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Entry point for `request`: its `__entry_point__` argument, or the
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchpadError::UnknownEntryPoint`] if nothing is registered
    /// under the resolved name.
    pub fn resolve(&self, request: &LaunchRequest) -> LaunchpadResult<Arc<dyn EntryPoint>> {
        let name = request.entry_point().unwrap_or(&self.default_name);
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| LaunchpadError::UnknownEntryPoint(name.to_owned()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Name used when a request does not pick one.
    #[must_use]
    pub fn default_name(&self) -> &str {
        &self.default_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrt_core::{AppId, ENTRY_POINT_ARG, RequestKind};

    struct Fixed(&'static str, i32);

    impl EntryPoint for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn run(&self, _ctx: LaunchContext) -> i32 {
            self.1
        }
    }

    fn request() -> LaunchRequest {
        LaunchRequest::new(AppId::new("org.example.clock").unwrap(), RequestKind::Start)
    }

    fn registry() -> EntryPointRegistry {
        let mut registry = EntryPointRegistry::new("widget-host");
        registry.register(Arc::new(Fixed("widget-host", 0))).unwrap();
        registry.register(Arc::new(Fixed("service-host", 3))).unwrap();
        registry
    }

    #[test]
    fn test_resolve_default_and_named() {
        let registry = registry();
        let default = registry.resolve(&request()).unwrap();
        assert_eq!(default.name(), "widget-host");

        let named = registry
            .resolve(&request().with_arg(ENTRY_POINT_ARG, "service-host"))
            .unwrap();
        assert_eq!(named.run(LaunchContext::cold(request())), 3);
    }

    #[test]
    fn test_resolve_unknown_name() {
        let err = registry()
            .resolve(&request().with_arg(ENTRY_POINT_ARG, "nope"))
            .err()
            .unwrap();
        assert!(matches!(err, LaunchpadError::UnknownEntryPoint(name) if name == "nope"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry.register(Arc::new(Fixed("widget-host", 1))).unwrap_err();
        assert!(matches!(err, LaunchpadError::DuplicateEntryPoint(_)));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["service-host", "widget-host"]);
    }

    #[test]
    fn test_cold_context_has_no_status_channel() {
        let ctx = LaunchContext::cold(request());
        assert_eq!(ctx.origin, LaunchOrigin::Cold);
        assert!(ctx.status.is_none());
        assert_eq!(ctx.worker_pid(), None);
    }
}
