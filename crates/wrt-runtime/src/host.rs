//! The `widget-host` entry point.
//!
//! Turns a launch request into a running widget: prepares, checks and shows
//! the view, reports first-render status back to the launchpad, presents the
//! window after the display delay, and maps process signals to lifecycle
//! operations until the widget is hidden.
//!
//! | Signal | Operation |
//! |---|---|
//! | `SIGUSR1` | suspend |
//! | `SIGUSR2` | resume |
//! | `SIGHUP` | reset |
//! | `SIGTERM`, `SIGINT` | hide and exit |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nix::unistd::getpid;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use wrt_config::Config;
use wrt_core::{LaunchRequest, ResourceGroupManager};
use wrt_launchpad::{
    EntryPoint, EntryPointRegistry, LaunchContext, LaunchStatusReporter, LaunchpadResult,
    ReporterTimers,
};

use crate::error::{RuntimeError, RuntimeResult};
use crate::state::Operation;
use crate::view::{ContextHandle, HeadlessBackend, ViewBackend, ViewEvent, WindowHandle};
use crate::widget::WidgetRuntime;

/// Name of the widget host entry point.
pub const WIDGET_HOST: &str = "widget-host";

/// Request argument overriding the start URL.
pub const START_URL_ARG: &str = "start_url";

/// Request argument naming the view category.
pub const CATEGORY_ARG: &str = "category";

/// Lifecycle commands delivered to a running host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    /// Move to the background.
    Suspend,
    /// Return from the background.
    Resume,
    /// Reload the start URL.
    Reset,
    /// Hide and exit.
    Hide,
}

/// Widget host timing and paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetHostSettings {
    /// Directory holding installed widgets.
    pub widget_root: PathBuf,
    /// Delay between the first frame and presenting the window.
    pub display_delay: Duration,
    /// Launch status reporter timers.
    pub timers: ReporterTimers,
}

impl WidgetHostSettings {
    /// Settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            widget_root: config.runtime.widget_root.clone(),
            display_delay: config.runtime.display_delay(),
            timers: ReporterTimers {
                delayed: config.reporter.delayed_timer(),
                finished: config.reporter.finished_timer(),
            },
        }
    }
}

/// The built-in entry point for web widgets.
#[derive(Debug, Clone)]
pub struct WidgetHost {
    settings: WidgetHostSettings,
    groups: ResourceGroupManager,
}

impl WidgetHost {
    /// Create a host.
    #[must_use]
    pub fn new(settings: WidgetHostSettings, groups: ResourceGroupManager) -> Self {
        Self { settings, groups }
    }

    /// URL the widget starts at: the `start_url` argument, or the widget's
    /// `index.html` under the widget root.
    #[must_use]
    pub fn start_url(&self, request: &LaunchRequest) -> String {
        request.arg(START_URL_ARG).map_or_else(
            || {
                format!(
                    "file://{}/{}/index.html",
                    self.settings.widget_root.display(),
                    request.app_id
                )
            },
            str::to_owned,
        )
    }

    /// Run one widget until it is hidden or `commands` closes.
    ///
    /// Returns the runtime in its final state.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::LaunchRefused`] if the view could not be
    /// prepared or the launch check refused it, and any lifecycle error
    /// raised while launching or hiding.
    pub async fn serve<V: ViewBackend>(
        &self,
        ctx: LaunchContext,
        view: V,
        commands: mpsc::UnboundedReceiver<HostCommand>,
    ) -> RuntimeResult<WidgetRuntime<V>> {
        let instance = Uuid::new_v4();
        let span = info_span!("widget", app_id = %ctx.request.app_id, %instance);
        self.serve_inner(ctx, view, commands).instrument(span).await
    }

    async fn serve_inner<V: ViewBackend>(
        &self,
        ctx: LaunchContext,
        mut view: V,
        mut commands: mpsc::UnboundedReceiver<HostCommand>,
    ) -> RuntimeResult<WidgetRuntime<V>> {
        let worker_pid = ctx.worker_pid();
        // Early returns drop `worker`, which kills it.
        let LaunchContext {
            request,
            origin,
            status,
            worker,
        } = ctx;

        let mut events = view.take_events();
        let mut widget =
            WidgetRuntime::new(request.app_id.clone(), view, self.groups.clone(), getpid(), worker_pid);
        let mut reporter = LaunchStatusReporter::start(status, self.settings.timers);

        let start_url = self.start_url(&request);
        let category = request.arg(CATEGORY_ARG).unwrap_or("widget");
        if !widget.prepare_view(&start_url, WindowHandle(1), ContextHandle(1), category)? {
            return Err(RuntimeError::LaunchRefused(Operation::PrepareView));
        }
        if !widget.check_before_launch()? {
            return Err(RuntimeError::LaunchRefused(Operation::CheckBeforeLaunch));
        }
        widget.show()?;
        info!(%start_url, kind = %request.kind, ?origin, "widget running");

        let mut display_at: Option<Instant> = None;
        let mut presented = false;
        loop {
            tokio::select! {
                () = reporter.tick() => {},
                () = sleep_until_optional(display_at) => {
                    display_at = None;
                    presented = true;
                    widget.view_mut().present()?;
                },
                Some(event) = next_event(events.as_mut()) => match event {
                    ViewEvent::FirstFrameRendered => {
                        reporter.first_frame_rendered();
                        if !presented && display_at.is_none() {
                            display_at = Instant::now().checked_add(self.settings.display_delay);
                        }
                    },
                    ViewEvent::CloseRequested => {
                        info!("widget asked to close");
                        widget.hide()?;
                        break;
                    },
                },
                command = commands.recv() => match command {
                    Some(HostCommand::Hide) | None => {
                        widget.hide()?;
                        break;
                    },
                    Some(command) => {
                        let result = match command {
                            HostCommand::Suspend => widget.suspend(),
                            HostCommand::Resume => widget.resume(),
                            HostCommand::Reset => widget.reset(),
                            HostCommand::Hide => Ok(()),
                        };
                        if let Err(e) = result {
                            warn!(?command, error = %e, "lifecycle command rejected");
                        }
                    },
                },
            }
        }

        if let Some(worker) = worker
            && let Err(e) = worker.stop()
        {
            warn!(error = %e, "failed to stop worker process");
        }
        Ok(widget)
    }
}

impl EntryPoint for WidgetHost {
    fn name(&self) -> &str {
        WIDGET_HOST
    }

    fn run(&self, ctx: LaunchContext) -> i32 {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "failed to build widget runtime");
                return 1;
            },
        };

        let result = runtime.block_on(async {
            let commands = forward_signals()?;
            self.serve(ctx, HeadlessBackend::new(), commands).await
        });
        match result {
            Ok(_) => 0,
            Err(e) => {
                error!(error = %e, "widget host failed");
                1
            },
        }
    }
}

/// Map process signals to host commands.
fn forward_signals() -> std::io::Result<mpsc::UnboundedReceiver<HostCommand>> {
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let command = tokio::select! {
                _ = usr1.recv() => HostCommand::Suspend,
                _ = usr2.recv() => HostCommand::Resume,
                _ = hup.recv() => HostCommand::Reset,
                _ = term.recv() => HostCommand::Hide,
                _ = int.recv() => HostCommand::Hide,
            };
            if tx.send(command).is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

async fn next_event(
    events: Option<&mut mpsc::UnboundedReceiver<ViewEvent>>,
) -> Option<ViewEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_optional(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Entry points compiled into the `wrt` launcher.
///
/// # Errors
///
/// Returns an error if two entry points share a name.
pub fn registry(config: &Config, groups: ResourceGroupManager) -> LaunchpadResult<EntryPointRegistry> {
    let mut registry = EntryPointRegistry::new(config.candidate.default_entry_point.clone());
    registry.register(Arc::new(WidgetHost::new(
        WidgetHostSettings::from_config(config),
        groups,
    )))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::unix::net::UnixStream;

    use nix::sys::signal::kill;
    use wrt_core::{AppId, LaunchStatus, RequestKind};
    use wrt_launchpad::WorkerProcess;

    use super::*;
    use crate::state::WidgetState;

    fn host() -> WidgetHost {
        WidgetHost::new(
            WidgetHostSettings::from_config(&Config::default()),
            ResourceGroupManager::disabled(),
        )
    }

    fn request() -> LaunchRequest {
        LaunchRequest::new(AppId::new("org.example.clock").unwrap(), RequestKind::Start)
    }

    fn codes(mut peer: UnixStream) -> Vec<i32> {
        let mut buf = Vec::new();
        peer.read_to_end(&mut buf).unwrap();
        buf.chunks_exact(4)
            .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_start_url_default_and_override() {
        let host = host();
        assert_eq!(
            host.start_url(&request()),
            "file:///opt/widgets/org.example.clock/index.html"
        );
        assert_eq!(
            host.start_url(&request().with_arg(START_URL_ARG, "https://example.org/w")),
            "https://example.org/w"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handed_off_widget_reports_finished_and_follows_commands() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let ctx = LaunchContext::handed_off(request(), ours, None);
        let (tx, rx) = mpsc::unbounded_channel();
        let host = host();

        let script = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(HostCommand::Suspend).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(HostCommand::Resume).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(HostCommand::Hide).unwrap();
        };
        let (widget, ()) = tokio::join!(host.serve(ctx, HeadlessBackend::new(), rx), script);
        let widget = widget.unwrap();

        assert_eq!(widget.state(), WidgetState::Hidden);
        assert!(widget.view().is_presented());
        assert_eq!(codes(theirs), [LaunchStatus::Finished.code()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_first_frame_reports_delayed() {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let ctx = LaunchContext::handed_off(request(), ours, None);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut view = HeadlessBackend::new();
        // Nobody listens for engine events, so the first frame never arrives.
        drop(view.take_events());
        let host = host();

        let script = async {
            tokio::time::sleep(Duration::from_secs(6)).await;
            tx.send(HostCommand::Hide).unwrap();
        };
        let (widget, ()) = tokio::join!(host.serve(ctx, view, rx), script);
        let widget = widget.unwrap();

        assert!(!widget.view().is_presented());
        assert_eq!(codes(theirs), [LaunchStatus::Delayed.code()]);
    }

    #[tokio::test]
    async fn test_refused_launch_is_error() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut view = HeadlessBackend::new();
        view.deny_launch();

        let err = host()
            .serve(LaunchContext::cold(request()), view, rx)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RuntimeError::LaunchRefused(Operation::CheckBeforeLaunch)
        ));
    }

    #[tokio::test]
    async fn test_refused_launch_kills_worker() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let worker = WorkerProcess::spawn(&["sleep".to_owned(), "30".to_owned()])
            .unwrap()
            .unwrap();
        let worker_pid = worker.pid();
        let ctx = LaunchContext::handed_off(request(), ours, Some(worker));
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut view = HeadlessBackend::new();
        view.deny_launch();

        assert!(host().serve(ctx, view, rx).await.is_err());
        assert!(kill(worker_pid, None).is_err());
    }

    #[tokio::test]
    async fn test_hidden_widget_stops_worker() {
        let worker = WorkerProcess::spawn(&["sleep".to_owned(), "30".to_owned()])
            .unwrap()
            .unwrap();
        let worker_pid = worker.pid();
        let mut ctx = LaunchContext::cold(request());
        ctx.worker = Some(worker);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(HostCommand::Hide).unwrap();

        let widget = host().serve(ctx, HeadlessBackend::new(), rx).await.unwrap();
        assert_eq!(widget.state(), WidgetState::Hidden);
        assert!(kill(worker_pid, None).is_err());
    }

    #[tokio::test]
    async fn test_close_request_hides_widget() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let view = HeadlessBackend::new();
        view.event_sender().send(ViewEvent::CloseRequested).unwrap();

        let widget = host()
            .serve(LaunchContext::cold(request()), view, rx)
            .await
            .unwrap();
        assert_eq!(widget.state(), WidgetState::Hidden);
    }

    #[tokio::test]
    async fn test_forbidden_command_is_not_fatal() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(HostCommand::Resume).unwrap();
        tx.send(HostCommand::Hide).unwrap();

        let widget = host()
            .serve(LaunchContext::cold(request()), HeadlessBackend::new(), rx)
            .await
            .unwrap();
        assert_eq!(widget.state(), WidgetState::Hidden);
    }

    #[test]
    fn test_registry_resolves_widget_host_by_default() {
        let registry = registry(&Config::default(), ResourceGroupManager::disabled()).unwrap();
        assert_eq!(registry.resolve(&request()).unwrap().name(), WIDGET_HOST);
    }
}
