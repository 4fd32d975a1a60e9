//! Shared harness: a launchpad on tempdir sockets whose candidates are
//! threads running the real candidate lifecycle.
//!
//! Every candidate thread lives in the test process, so a warm hand-off
//! replies with the test process's own pid. Cold spawns are only recorded
//! and get pids from a private range.

#![allow(dead_code)]

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use wrt_config::Config;
use wrt_core::{AppId, LaunchRequest, Pid, RequestKind, ResourceGroupManager};
use wrt_launchpad::protocol::Registration;
use wrt_launchpad::{
    CandidateLifecycle, CandidateSettings, ChildExit, EntryPoint, EntryPointRegistry,
    LaunchContext, LaunchOrigin, LaunchRequestRouter, LaunchpadResult, ProcessPoolScheduler,
    ProcessSpawner, daemon,
};
use wrt_runtime::{HeadlessBackend, HostCommand, WidgetHost, WidgetHostSettings, WidgetState};

/// Name of the test entry point.
pub const HEADLESS: &str = "headless-widget";

/// What a finished widget reported back to the test.
#[derive(Debug)]
pub struct Outcome {
    /// The request the widget ran.
    pub request: LaunchRequest,
    /// How its process was created.
    pub origin: LaunchOrigin,
    /// Final lifecycle state.
    pub state: WidgetState,
    /// Whether the window was presented.
    pub presented: bool,
}

/// The widget host on a headless view, hidden after a fixed time.
pub struct HeadlessWidget {
    host: WidgetHost,
    hide_after: Duration,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl EntryPoint for HeadlessWidget {
    fn name(&self) -> &str {
        HEADLESS
    }

    fn run(&self, ctx: LaunchContext) -> i32 {
        let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        else {
            return 1;
        };
        let request = ctx.request.clone();
        let origin = ctx.origin;
        let hide_after = self.hide_after;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let result = runtime.block_on(async {
            tokio::spawn(async move {
                tokio::time::sleep(hide_after).await;
                let _ = commands_tx.send(HostCommand::Hide);
            });
            self.host.serve(ctx, HeadlessBackend::new(), commands_rx).await
        });

        match result {
            Ok(widget) => {
                let _ = self.outcomes.send(Outcome {
                    request,
                    origin,
                    state: widget.state(),
                    presented: widget.view().is_presented(),
                });
                0
            },
            Err(_) => 1,
        }
    }
}

/// Registry holding only the headless widget.
pub fn headless_registry(
    config: &Config,
    outcomes: mpsc::UnboundedSender<Outcome>,
) -> EntryPointRegistry {
    let mut registry = EntryPointRegistry::new(HEADLESS);
    registry
        .register(Arc::new(HeadlessWidget {
            host: WidgetHost::new(
                WidgetHostSettings::from_config(config),
                ResourceGroupManager::disabled(),
            ),
            hide_after: Duration::from_millis(200),
            outcomes,
        }))
        .unwrap();
    registry
}

/// Fast timers and tempdir sockets.
pub fn test_config(dir: &Path, pool: bool) -> Config {
    let mut config = Config::default();
    config.launchpad.pool_enabled = pool;
    config.launchpad.launch_socket = Some(dir.join("launch.sock"));
    config.launchpad.pool_socket = Some(dir.join("pool.sock"));
    config.launchpad.respawn_delay_ms = 10;
    config.candidate.nice = 0;
    config.reporter.finished_timer_ms = 20;
    config.runtime.display_delay_ms = 5;
    config
}

/// This process's pid, which every in-process candidate registers with.
pub fn own_pid() -> Pid {
    Pid::from_raw(i32::try_from(std::process::id()).unwrap())
}

/// Spawns candidates as threads in this process.
#[derive(Debug)]
pub struct ThreadSpawner {
    pool_socket: PathBuf,
    registry: EntryPointRegistry,
    spawned: Arc<AtomicUsize>,
    cold: Arc<Mutex<Vec<LaunchRequest>>>,
    crash_first: bool,
    next_pid: i32,
}

impl ThreadSpawner {
    fn fake_pid(&mut self) -> Pid {
        self.next_pid = self.next_pid.saturating_add(1);
        Pid::from_raw(self.next_pid)
    }
}

impl ProcessSpawner for ThreadSpawner {
    fn spawn_candidate(&mut self) -> std::io::Result<Pid> {
        let index = self.spawned.fetch_add(1, Ordering::SeqCst);
        let settings = CandidateSettings {
            pool_socket: self.pool_socket.clone(),
            nice: 0,
            worker_command: Vec::new(),
            register_timeout: Duration::from_secs(1),
        };

        if self.crash_first && index == 0 {
            // Registers, then dies before any hand-off.
            std::thread::spawn(move || {
                if let Ok(mut stream) = UnixStream::connect(&settings.pool_socket) {
                    let record = Registration {
                        pid: own_pid(),
                        worker_pid: None,
                    }
                    .encode();
                    let _ = stream.write_all(&record);
                }
            });
        } else {
            let lifecycle = CandidateLifecycle::new(
                settings,
                self.registry.clone(),
                ResourceGroupManager::disabled(),
            );
            std::thread::spawn(move || lifecycle.run());
        }
        Ok(self.fake_pid())
    }

    fn spawn_cold(&mut self, request: &LaunchRequest) -> std::io::Result<Pid> {
        self.cold.lock().unwrap().push(request.clone());
        Ok(self.fake_pid())
    }
}

/// A running launchpad and the handles tests observe it through.
pub struct Launchpad {
    /// Configuration the launchpad was built from.
    pub config: Config,
    /// Number of candidates spawned so far.
    pub spawned: Arc<AtomicUsize>,
    /// Requests that went down the cold path.
    pub cold: Arc<Mutex<Vec<LaunchRequest>>>,
    /// Widgets that ran to completion.
    pub outcomes: mpsc::UnboundedReceiver<Outcome>,
    stop: oneshot::Sender<()>,
    daemon: JoinHandle<LaunchpadResult<()>>,
    _exits: mpsc::UnboundedSender<ChildExit>,
    _dir: TempDir,
}

impl Launchpad {
    /// Bind and start serving. Must run inside a multi-threaded runtime.
    pub fn start(pool: bool, crash_first: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), pool);
        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();
        let spawned = Arc::new(AtomicUsize::new(0));
        let cold = Arc::new(Mutex::new(Vec::new()));

        let spawner = ThreadSpawner {
            pool_socket: config.launchpad.pool_socket_path(),
            registry: headless_registry(&config, outcomes_tx),
            spawned: Arc::clone(&spawned),
            cold: Arc::clone(&cold),
            crash_first,
            next_pid: 90_000,
        };
        let scheduler = ProcessPoolScheduler::new(
            daemon::pool_settings(&config),
            spawner,
            ResourceGroupManager::disabled(),
        );
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        let router =
            LaunchRequestRouter::bind(&daemon::router_settings(&config), scheduler, exits_rx)
                .unwrap();

        let (stop, stop_rx) = oneshot::channel::<()>();
        let daemon = tokio::spawn(router.run(async {
            let _ = stop_rx.await;
        }));

        Self {
            config,
            spawned,
            cold,
            outcomes,
            stop,
            daemon,
            _exits: exits_tx,
            _dir: dir,
        }
    }

    /// Launch socket path.
    pub fn launch_socket(&self) -> PathBuf {
        self.config.launchpad.launch_socket_path()
    }

    /// Retry a launch until a warm candidate takes it. Attempts made before
    /// a candidate registered go down the cold path.
    pub async fn launch_warm(&self, request: &LaunchRequest) -> Pid {
        let socket = self.launch_socket();
        for _ in 0..250 {
            if let Ok(pid) = wrt_launchpad::request_launch(&socket, request).await {
                if pid == own_pid() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no warm candidate took the launch");
    }

    /// Wait for the next finished widget.
    pub async fn next_outcome(&mut self) -> Outcome {
        tokio::time::timeout(Duration::from_secs(5), self.outcomes.recv())
            .await
            .unwrap()
            .unwrap()
    }

    /// Wait until at least `count` candidates were spawned.
    pub async fn wait_for_spawns(&self, count: usize) {
        for _ in 0..250 {
            if self.spawned.load(Ordering::SeqCst) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {count} candidate spawns");
    }

    /// Stop the daemon and wait for it to clean up.
    pub async fn shutdown(self) {
        let socket = self.launch_socket();
        self.stop.send(()).unwrap();
        self.daemon.await.unwrap().unwrap();
        assert!(!socket.exists());
    }
}

/// A request for the test widget.
pub fn request(app: &str) -> LaunchRequest {
    LaunchRequest::new(AppId::new(app).unwrap(), RequestKind::Start)
        .with_arg("start_url", format!("https://widgets.test/{app}"))
}
