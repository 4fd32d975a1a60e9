//! The rendering engine seam.
//!
//! [`ViewBackend`] is the side-effect half of every widget operation. A real
//! engine binding implements it outside this workspace; [`HeadlessBackend`]
//! keeps just enough state to drive the launch pipeline and tests.

use std::collections::HashSet;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{ViewError, ViewResult};
use crate::state::Operation;

/// Native window the view is embedded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Engine context (process/session) the view belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(pub u64);

/// Opaque handle to the live webview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WebviewHandle(pub u64);

/// Asynchronous notifications from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    /// The first frame of the start page was rendered.
    FirstFrameRendered,
    /// The page asked to close the widget.
    CloseRequested,
}

/// Embedder callbacks installed with `set_user_delegates`.
#[derive(Default)]
pub struct UserDelegates {
    /// Called with the URL of every finished page load.
    pub on_load_finished: Option<Box<dyn Fn(&str) + Send>>,
    /// Called with page title changes.
    pub on_title_changed: Option<Box<dyn Fn(&str) + Send>>,
}

impl fmt::Debug for UserDelegates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDelegates")
            .field("on_load_finished", &self.on_load_finished.is_some())
            .field("on_title_changed", &self.on_title_changed.is_some())
            .finish()
    }
}

/// Side effects of widget operations.
///
/// Methods are only called after the state machine allowed the operation.
pub trait ViewBackend {
    /// Create the view in `window` and start loading `start_url`.
    /// `Ok(false)` means the view could not be prepared.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn prepare(
        &mut self,
        start_url: &str,
        window: WindowHandle,
        context: ContextHandle,
        category: &str,
    ) -> ViewResult<bool>;

    /// Pre-launch checks. `Ok(false)` refuses the launch.
    ///
    /// # Errors
    ///
    /// Returns an error if the checks could not run.
    fn check_before_launch(&mut self) -> ViewResult<bool>;

    /// Start rendering and accept input.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn show(&mut self) -> ViewResult<()>;

    /// Tear the view down.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn hide(&mut self) -> ViewResult<()>;

    /// Pause timers and rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn suspend(&mut self) -> ViewResult<()>;

    /// Undo [`suspend`](Self::suspend).
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn resume(&mut self) -> ViewResult<()>;

    /// Reload the start URL with fresh page state.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn reset(&mut self) -> ViewResult<()>;

    /// The live webview, if one exists.
    fn current_webview(&self) -> Option<WebviewHandle>;

    /// Install embedder callbacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn set_user_delegates(&mut self, delegates: UserDelegates) -> ViewResult<()>;

    /// Navigate back in history.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn backward(&mut self) -> ViewResult<()>;

    /// Reload the current page.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn reload(&mut self) -> ViewResult<()>;

    /// Dispatch a custom DOM event carrying `data` into the page.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn fire_javascript_event(&mut self, event: &str, data: &str) -> ViewResult<()>;

    /// Make the rendered view visible to the user. Called once, after the
    /// display delay; not a lifecycle operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine failed.
    fn present(&mut self) -> ViewResult<()>;

    /// Engine event stream. Returns `None` after the first call.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ViewEvent>>;
}

/// Engine-less backend.
///
/// Tracks the loaded URL, history and visibility, reports the first frame
/// when shown, and can be told to fail specific operations.
#[derive(Debug)]
pub struct HeadlessBackend {
    start_url: Option<String>,
    history: Vec<String>,
    webview: Option<WebviewHandle>,
    visible: bool,
    suspended: bool,
    presented: bool,
    first_frame_sent: bool,
    launch_allowed: bool,
    delegates: UserDelegates,
    fired_events: Vec<(String, String)>,
    failing: HashSet<Operation>,
    events_tx: mpsc::UnboundedSender<ViewEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<ViewEvent>>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// A backend with nothing loaded.
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            start_url: None,
            history: Vec::new(),
            webview: None,
            visible: false,
            suspended: false,
            presented: false,
            first_frame_sent: false,
            launch_allowed: true,
            delegates: UserDelegates::default(),
            fired_events: Vec::new(),
            failing: HashSet::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Make the side effect of `operation` fail from now on.
    pub fn fail_on(&mut self, operation: Operation) {
        self.failing.insert(operation);
    }

    /// Make `check_before_launch` refuse.
    pub fn deny_launch(&mut self) {
        self.launch_allowed = false;
    }

    /// Sender for injecting engine events.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ViewEvent> {
        self.events_tx.clone()
    }

    /// URL currently displayed.
    #[must_use]
    pub fn current_url(&self) -> Option<&str> {
        self.history.last().map(String::as_str)
    }

    /// Whether the view is shown and not suspended.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.visible && !self.suspended
    }

    /// Whether [`present`](ViewBackend::present) ran.
    #[must_use]
    pub fn is_presented(&self) -> bool {
        self.presented
    }

    /// Events fired into the page so far.
    #[must_use]
    pub fn fired_events(&self) -> &[(String, String)] {
        &self.fired_events
    }

    fn check(&self, operation: Operation) -> ViewResult<()> {
        if self.failing.contains(&operation) {
            return Err(ViewError::Backend {
                operation,
                message: "injected failure".into(),
            });
        }
        Ok(())
    }

    fn loaded(&self, url: &str) {
        if let Some(callback) = &self.delegates.on_load_finished {
            callback(url);
        }
    }

    fn start_url(&self) -> ViewResult<&str> {
        self.start_url.as_deref().ok_or(ViewError::NotPrepared)
    }
}

impl ViewBackend for HeadlessBackend {
    fn prepare(
        &mut self,
        start_url: &str,
        window: WindowHandle,
        context: ContextHandle,
        category: &str,
    ) -> ViewResult<bool> {
        self.check(Operation::PrepareView)?;
        if !start_url.contains("://") {
            debug!(start_url, "start URL has no scheme, not preparing");
            return Ok(false);
        }
        debug!(start_url, window = window.0, context = context.0, category, "view prepared");
        self.start_url = Some(start_url.to_owned());
        self.history = vec![start_url.to_owned()];
        self.webview = Some(WebviewHandle(window.0));
        Ok(true)
    }

    fn check_before_launch(&mut self) -> ViewResult<bool> {
        self.check(Operation::CheckBeforeLaunch)?;
        Ok(self.launch_allowed)
    }

    fn show(&mut self) -> ViewResult<()> {
        self.check(Operation::Show)?;
        let url = self.start_url()?.to_owned();
        self.visible = true;
        self.loaded(&url);
        if !self.first_frame_sent {
            self.first_frame_sent = true;
            let _ = self.events_tx.send(ViewEvent::FirstFrameRendered);
        }
        Ok(())
    }

    fn hide(&mut self) -> ViewResult<()> {
        self.check(Operation::Hide)?;
        self.visible = false;
        self.webview = None;
        Ok(())
    }

    fn suspend(&mut self) -> ViewResult<()> {
        self.check(Operation::Suspend)?;
        self.suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> ViewResult<()> {
        self.check(Operation::Resume)?;
        self.suspended = false;
        Ok(())
    }

    fn reset(&mut self) -> ViewResult<()> {
        self.check(Operation::Reset)?;
        let url = self.start_url()?.to_owned();
        self.history = vec![url.clone()];
        self.suspended = false;
        self.loaded(&url);
        Ok(())
    }

    fn current_webview(&self) -> Option<WebviewHandle> {
        self.webview
    }

    fn set_user_delegates(&mut self, delegates: UserDelegates) -> ViewResult<()> {
        self.check(Operation::SetUserDelegates)?;
        self.delegates = delegates;
        Ok(())
    }

    fn backward(&mut self) -> ViewResult<()> {
        self.check(Operation::Backward)?;
        if self.history.len() > 1 {
            self.history.pop();
        }
        Ok(())
    }

    fn reload(&mut self) -> ViewResult<()> {
        self.check(Operation::Reload)?;
        if let Some(url) = self.history.last() {
            self.loaded(url);
        }
        Ok(())
    }

    fn fire_javascript_event(&mut self, event: &str, data: &str) -> ViewResult<()> {
        self.check(Operation::FireJavascriptEvent)?;
        self.fired_events.push((event.to_owned(), data.to_owned()));
        Ok(())
    }

    fn present(&mut self) -> ViewResult<()> {
        self.presented = true;
        info!(url = ?self.current_url(), "widget presented");
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ViewEvent>> {
        self.events_rx.take()
    }
}
