//! The launchpad event loop.
//!
//! One task multiplexes every input the daemon has: launch requests, candidate
//! registrations, the pooled candidate's status channel, child exits and the
//! replenishment deadline. Each event is handled to completion before the
//! next one is polled, so scheduler state never needs locking.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::error::{LaunchpadError, LaunchpadResult};
use crate::protocol::{self, REGISTRATION_LEN, Registration, reply};
use crate::scheduler::ProcessPoolScheduler;
use crate::spawner::{ChildExit, ProcessSpawner};

/// Socket locations and read bounds for the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    /// Launch-request socket.
    pub launch_socket: PathBuf,
    /// Pool-registration socket. `None` runs without a pool.
    pub pool_socket: Option<PathBuf>,
    /// Upper bound on reading a launch packet or a registration record.
    pub request_timeout: Duration,
}

/// Routes inbound launch requests to the scheduler.
#[derive(Debug)]
pub struct LaunchRequestRouter<S> {
    launch_listener: UnixListener,
    pool_listener: Option<UnixListener>,
    scheduler: ProcessPoolScheduler<S>,
    exits: mpsc::UnboundedReceiver<ChildExit>,
    request_timeout: Duration,
    socket_paths: Vec<PathBuf>,
}

impl<S: ProcessSpawner> LaunchRequestRouter<S> {
    /// Bind the daemon sockets.
    ///
    /// Failing to bind the pool socket is not fatal: the scheduler is told
    /// to stop pooling and every launch becomes a cold spawn.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the launch socket cannot be bound.
    pub fn bind(
        settings: &RouterSettings,
        mut scheduler: ProcessPoolScheduler<S>,
        exits: mpsc::UnboundedReceiver<ChildExit>,
    ) -> LaunchpadResult<Self> {
        let launch_listener = bind_socket(&settings.launch_socket)?;
        let mut socket_paths = vec![settings.launch_socket.clone()];
        info!(path = %settings.launch_socket.display(), "launch socket listening");

        let pool_listener = match &settings.pool_socket {
            Some(path) if scheduler.pooling_active() => match bind_socket(path) {
                Ok(listener) => {
                    info!(path = %path.display(), "pool socket listening");
                    socket_paths.push(path.clone());
                    Some(listener)
                },
                Err(e) => {
                    let err =
                        LaunchpadError::PoolProtocol(format!("bind {} failed: {e}", path.display()));
                    warn!(error = %err, "running without warm pool");
                    scheduler.disable_pool();
                    None
                },
            },
            _ => {
                scheduler.disable_pool();
                None
            },
        };

        Ok(Self {
            launch_listener,
            pool_listener,
            scheduler,
            exits,
            request_timeout: settings.request_timeout,
            socket_paths,
        })
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &ProcessPoolScheduler<S> {
        &self.scheduler
    }

    /// Run until `shutdown` resolves, then remove the socket files.
    ///
    /// Accept errors are logged and the loop continues.
    ///
    /// # Errors
    ///
    /// Does not fail once the sockets are bound.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> LaunchpadResult<()> {
        tokio::pin!(shutdown);
        self.scheduler.start();

        loop {
            let replenish_at = self.scheduler.replenish_deadline();
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("launchpad shutting down");
                    break;
                },
                accepted = self.launch_listener.accept() => match accepted {
                    Ok((stream, _)) => self.handle_launch(stream).await,
                    Err(e) => warn!(error = %e, "accept on launch socket failed"),
                },
                accepted = accept_optional(self.pool_listener.as_ref()) => match accepted {
                    Ok(stream) => self.handle_registration(stream).await,
                    Err(e) => {
                        let err = LaunchpadError::PoolProtocol(format!("accept failed: {e}"));
                        warn!(error = %err, "ignoring registration");
                    },
                },
                event = self.scheduler.next_candidate_event() => {
                    self.scheduler.handle_candidate_event(event);
                },
                Some(exit) = self.exits.recv() => self.scheduler.on_child_exit(exit),
                () = sleep_until_optional(replenish_at) => self.scheduler.replenish(),
            }
        }

        for path in &self.socket_paths {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "socket cleanup failed");
            }
        }
        Ok(())
    }

    async fn handle_launch(&mut self, mut stream: UnixStream) {
        let caller_pid = match stream.peer_cred() {
            Ok(cred) => cred.pid().unwrap_or(0),
            Err(e) => {
                debug!(error = %e, "peer credentials unavailable");
                0
            },
        };

        let read = timeout(
            self.request_timeout,
            protocol::read_launch_request(&mut stream, caller_pid),
        )
        .await
        .unwrap_or(Err(LaunchpadError::Timeout("reading launch packet")));

        let code = match read {
            Ok(request) => {
                debug!(app_id = %request.app_id, caller_pid, "launch request received");
                match self.scheduler.dispatch(request).await {
                    Ok(pid) => pid.as_raw(),
                    Err(e) => {
                        error!(error = %e, "launch failed");
                        reply::LAUNCH_FAILED
                    },
                }
            },
            Err(e) => {
                warn!(caller_pid, error = %e, "rejecting launch request");
                reply::MALFORMED_REQUEST
            },
        };

        match timeout(self.request_timeout, protocol::write_reply(&mut stream, code)).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => debug!(error = %e, "launch caller went away before reply"),
            Err(_) => debug!("launch reply timed out"),
        }
    }

    async fn handle_registration(&mut self, mut stream: UnixStream) {
        let mut record = [0u8; REGISTRATION_LEN];
        let read = match timeout(self.request_timeout, stream.read_exact(&mut record)).await {
            Ok(Ok(_)) => Registration::parse(&record),
            Ok(Err(e)) => Err(LaunchpadError::PoolProtocol(format!(
                "short registration record: {e}"
            ))),
            Err(_) => Err(LaunchpadError::Timeout("reading registration")),
        };
        match read {
            Ok(registration) => {
                self.scheduler
                    .register_candidate(registration.pid, registration.worker_pid, stream);
            },
            Err(e) => warn!(error = %e, "dropping candidate registration"),
        }
    }
}

/// Bind a listener, replacing a stale socket file left by a previous run.
fn bind_socket(path: &Path) -> std::io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(e),
    }
    UnixListener::bind(path)
}

async fn accept_optional(listener: Option<&UnixListener>) -> std::io::Result<UnixStream> {
    match listener {
        Some(listener) => listener.accept().await.map(|(stream, _)| stream),
        None => std::future::pending().await,
    }
}

async fn sleep_until_optional(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;
    use wrt_core::{AppId, LaunchRequest, RequestKind, ResourceGroupManager};

    use super::*;
    use crate::scheduler::PoolSettings;
    use crate::scheduler::tests::FakeSpawner;

    fn settings(dir: &Path, pool: bool) -> RouterSettings {
        RouterSettings {
            launch_socket: dir.join("launch.sock"),
            pool_socket: pool.then(|| dir.join("pool.sock")),
            request_timeout: Duration::from_millis(500),
        }
    }

    fn router(settings: &RouterSettings) -> LaunchRequestRouter<FakeSpawner> {
        let (_tx, rx) = mpsc::unbounded_channel();
        let scheduler = ProcessPoolScheduler::new(
            PoolSettings::default(),
            FakeSpawner::default(),
            ResourceGroupManager::disabled(),
        );
        LaunchRequestRouter::bind(settings, scheduler, rx).unwrap()
    }

    async fn launch(socket: &Path, request: &LaunchRequest) -> i32 {
        let mut stream = UnixStream::connect(socket).await.unwrap();
        protocol::write_launch_request(&mut stream, request)
            .await
            .unwrap();
        protocol::read_reply(&mut stream).await.unwrap()
    }

    fn request() -> LaunchRequest {
        LaunchRequest::new(AppId::new("org.example.clock").unwrap(), RequestKind::Start)
    }

    #[tokio::test]
    async fn test_launch_without_pool_replies_cold_pid() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), false);
        let router = router(&settings);
        assert!(!router.scheduler().pooling_active());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let daemon = tokio::spawn(router.run(async {
            let _ = stop_rx.await;
        }));

        let first = launch(&settings.launch_socket, &request()).await;
        let second = launch(&settings.launch_socket, &request()).await;
        assert!(first > 0);
        assert!(second > first);

        stop_tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();
        assert!(!settings.launch_socket.exists());
    }

    #[tokio::test]
    async fn test_malformed_packet_gets_error_reply() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), false);
        let router = router(&settings);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let daemon = tokio::spawn(router.run(async {
            let _ = stop_rx.await;
        }));

        let mut stream = UnixStream::connect(&settings.launch_socket).await.unwrap();
        stream.write_all(&42i32.to_ne_bytes()).await.unwrap();
        stream.write_all(&0i32.to_ne_bytes()).await.unwrap();
        assert_eq!(
            protocol::read_reply(&mut stream).await.unwrap(),
            reply::MALFORMED_REQUEST
        );

        // The loop keeps serving after a bad request.
        assert!(launch(&settings.launch_socket, &request()).await > 0);

        stop_tx.send(()).unwrap();
        daemon.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pool_bind_failure_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path(), true);
        // A directory in place of the socket cannot be removed or bound.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(blocked.join("inner")).unwrap();
        settings.pool_socket = Some(blocked);

        let router = router(&settings);
        assert!(!router.scheduler().pooling_active());
        assert!(!router.scheduler().replenish_pending());
    }

    #[tokio::test]
    async fn test_stale_socket_file_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), false);
        std::fs::write(&settings.launch_socket, b"stale").unwrap();
        let _router = router(&settings);
        let meta = std::fs::symlink_metadata(&settings.launch_socket).unwrap();
        assert!(std::os::unix::fs::FileTypeExt::is_socket(&meta.file_type()));
    }
}
