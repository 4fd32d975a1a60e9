//! The warm candidate process.
//!
//! A candidate does everything a launch needs that does not depend on which
//! application will run, then parks on the pool socket. When the daemon hands
//! it a request it resolves the entry point and becomes that application
//! without another exec.
//!
//! This runs before any async runtime exists; the entry point builds its own.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::unistd::getpid;
use tracing::{debug, error, info, warn};

use wrt_config::Config;
use wrt_core::{ResourceGroup, ResourceGroupManager};

use crate::entry::{EntryPoint, EntryPointRegistry, LaunchContext};
use crate::error::{LaunchpadError, LaunchpadResult};
use crate::protocol::{self, Registration};
use crate::worker::WorkerProcess;

/// Exit code of a candidate that never reached its entry point.
pub const EXIT_BOOTSTRAP_FAILED: i32 = 70;

/// Candidate bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSettings {
    /// Pool-registration socket of the daemon.
    pub pool_socket: PathBuf,
    /// Nice value applied while idle.
    pub nice: i32,
    /// Worker process to start (program and arguments). Empty for none.
    pub worker_command: Vec<String>,
    /// Upper bound on writing the registration record.
    pub register_timeout: Duration,
}

impl CandidateSettings {
    /// Settings derived from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            pool_socket: config.launchpad.pool_socket_path(),
            nice: config.candidate.nice,
            worker_command: config.candidate.worker_command.clone(),
            register_timeout: config.launchpad.request_timeout(),
        }
    }
}

/// Drives one candidate from bootstrap to its entry point.
#[derive(Debug)]
pub struct CandidateLifecycle {
    settings: CandidateSettings,
    registry: EntryPointRegistry,
    groups: ResourceGroupManager,
}

impl CandidateLifecycle {
    /// Create a lifecycle.
    #[must_use]
    pub fn new(
        settings: CandidateSettings,
        registry: EntryPointRegistry,
        groups: ResourceGroupManager,
    ) -> Self {
        Self {
            settings,
            registry,
            groups,
        }
    }

    /// Bootstrap, wait for a hand-off and run the selected entry point.
    /// Returns the process exit code.
    #[must_use]
    pub fn run(self) -> i32 {
        match self.bootstrap() {
            Ok((entry, ctx)) => {
                info!(
                    entry_point = entry.name(),
                    app_id = %ctx.request.app_id,
                    "candidate becoming application"
                );
                entry.run(ctx)
            },
            Err(e) => {
                error!(error = %e, "candidate bootstrap failed");
                EXIT_BOOTSTRAP_FAILED
            },
        }
    }

    /// Everything up to and including entry point resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker cannot start, the daemon cannot be
    /// reached, the hand-off is invalid, or the entry point is unknown.
    pub fn bootstrap(&self) -> LaunchpadResult<(Arc<dyn EntryPoint>, LaunchContext)> {
        if let Err(e) = lower_priority(self.settings.nice) {
            warn!(nice = self.settings.nice, error = %e, "failed to lower priority");
        }

        // Dropping the worker on any error below kills it.
        let worker = WorkerProcess::spawn(&self.settings.worker_command)?;
        let pid = getpid();
        let worker_pid = worker.as_ref().map(WorkerProcess::pid);
        self.groups
            .move_best_effort(ResourceGroup::Background, pid, worker_pid);

        let mut stream = self.register(Registration { pid, worker_pid })?;
        debug!(pid = pid.as_raw(), "candidate waiting for hand-off");
        let request = protocol::read_handoff(&mut stream)?;

        let entry = self.registry.resolve(&request)?;
        Ok((entry, LaunchContext::handed_off(request, stream, worker)))
    }

    fn register(&self, registration: Registration) -> LaunchpadResult<UnixStream> {
        let mut stream = UnixStream::connect(&self.settings.pool_socket).map_err(|e| {
            LaunchpadError::PoolProtocol(format!(
                "connect to {} failed: {e}",
                self.settings.pool_socket.display()
            ))
        })?;
        stream.set_write_timeout(Some(self.settings.register_timeout))?;
        stream.write_all(&registration.encode())?;
        stream.set_write_timeout(None)?;
        Ok(stream)
    }
}

/// Set the nice value of the calling process.
#[allow(unsafe_code)]
fn lower_priority(nice: i32) -> std::io::Result<()> {
    // SAFETY: setpriority only reads its integer arguments. `who = 0` with
    // PRIO_PROCESS targets the calling process.
    let rc = unsafe { nix::libc::setpriority(nix::libc::PRIO_PROCESS, 0, nice) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::unix::net::UnixListener;

    use wrt_core::{AppId, ENTRY_POINT_ARG, LaunchRequest, LaunchStatus, RequestKind};

    use super::*;
    use crate::protocol::REGISTRATION_LEN;

    struct Echo;

    impl EntryPoint for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn run(&self, ctx: LaunchContext) -> i32 {
            let Some(mut status) = ctx.status else {
                return 1;
            };
            protocol::write_status(&mut status, LaunchStatus::Finished).unwrap();
            i32::try_from(ctx.request.args.len()).unwrap()
        }
    }

    fn lifecycle(socket: PathBuf) -> CandidateLifecycle {
        lifecycle_with_worker(socket, Vec::new())
    }

    fn lifecycle_with_worker(socket: PathBuf, worker_command: Vec<String>) -> CandidateLifecycle {
        let mut registry = EntryPointRegistry::new("echo");
        registry.register(Arc::new(Echo)).unwrap();
        CandidateLifecycle::new(
            CandidateSettings {
                pool_socket: socket,
                nice: 0,
                worker_command,
                register_timeout: Duration::from_secs(1),
            },
            registry,
            ResourceGroupManager::disabled(),
        )
    }

    /// Plays the daemon: reads the registration and hands off `request`.
    fn serve_one(listener: &UnixListener, request: &LaunchRequest) -> (Registration, i32) {
        use tokio_util::bytes::BytesMut;
        use tokio_util::codec::Encoder;

        let (mut conn, _) = listener.accept().unwrap();
        let mut record = [0u8; REGISTRATION_LEN];
        conn.read_exact(&mut record).unwrap();
        let registration = Registration::parse(&record).unwrap();

        let mut frame = BytesMut::new();
        protocol::CandidateCodec
            .encode(request.clone(), &mut frame)
            .unwrap();
        conn.write_all(&frame).unwrap();

        let mut code = [0u8; 4];
        conn.read_exact(&mut code).unwrap();
        (registration, i32::from_ne_bytes(code))
    }

    fn request() -> LaunchRequest {
        LaunchRequest::new(AppId::new("org.example.clock").unwrap(), RequestKind::Start)
            .with_arg("a", "1")
            .with_arg("b", "2")
    }

    #[test]
    fn test_candidate_registers_and_runs_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("pool.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let daemon = std::thread::spawn(move || serve_one(&listener, &request()));
        let code = lifecycle(socket).run();
        let (registration, status) = daemon.join().unwrap();

        assert_eq!(code, 2);
        assert_eq!(registration.pid, getpid());
        assert_eq!(registration.worker_pid, None);
        assert_eq!(status, LaunchStatus::Finished.code());
    }

    #[test]
    fn test_unknown_entry_point_fails_bootstrap() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("pool.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let daemon = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut record = [0u8; REGISTRATION_LEN];
            conn.read_exact(&mut record).unwrap();
            let payload = request()
                .with_arg(ENTRY_POINT_ARG, "missing")
                .to_json()
                .unwrap();
            conn.write_all(&u32::try_from(payload.len()).unwrap().to_be_bytes())
                .unwrap();
            conn.write_all(&payload).unwrap();
        });

        let err = lifecycle(socket).bootstrap().err().unwrap();
        daemon.join().unwrap();
        assert!(matches!(err, LaunchpadError::UnknownEntryPoint(name) if name == "missing"));
    }

    #[test]
    fn test_worker_killed_when_daemon_drops_registration() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("pool.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        // Reads the record and hangs up, as the daemon does when the slot is taken.
        let daemon = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut record = [0u8; REGISTRATION_LEN];
            conn.read_exact(&mut record).unwrap();
            Registration::parse(&record).unwrap()
        });

        let lifecycle =
            lifecycle_with_worker(socket, vec!["sleep".to_owned(), "30".to_owned()]);
        assert!(lifecycle.bootstrap().is_err());
        let worker = daemon.join().unwrap().worker_pid.unwrap();
        assert!(nix::sys::signal::kill(worker, None).is_err());
    }

    #[test]
    fn test_worker_killed_on_unknown_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("pool.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let daemon = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut record = [0u8; REGISTRATION_LEN];
            conn.read_exact(&mut record).unwrap();
            let payload = request()
                .with_arg(ENTRY_POINT_ARG, "missing")
                .to_json()
                .unwrap();
            conn.write_all(&u32::try_from(payload.len()).unwrap().to_be_bytes())
                .unwrap();
            conn.write_all(&payload).unwrap();
            Registration::parse(&record).unwrap()
        });

        let code = lifecycle_with_worker(socket, vec!["sleep".to_owned(), "30".to_owned()]).run();
        assert_eq!(code, EXIT_BOOTSTRAP_FAILED);
        let worker = daemon.join().unwrap().worker_pid.unwrap();
        assert!(nix::sys::signal::kill(worker, None).is_err());
    }

    #[test]
    fn test_unreachable_daemon_exits_nonzero() {
        let dir = tempfile::tempdir().unwrap();
        let code = lifecycle(dir.path().join("absent.sock")).run();
        assert_eq!(code, EXIT_BOOTSTRAP_FAILED);
    }
}
