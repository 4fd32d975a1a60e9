//! The widget runtime: public operations over a guarded view.

use nix::unistd::Pid;
use tracing::{debug, info};

use wrt_core::{AppId, ResourceGroup, ResourceGroupManager};

use crate::error::{RuntimeResult, ViewResult};
use crate::state::{Operation, Transition, WidgetState, WidgetStateMachine};
use crate::view::{ContextHandle, UserDelegates, ViewBackend, WebviewHandle, WindowHandle};

/// A launched widget.
///
/// Every operation follows allow → side effect → commit. Forbidden operations
/// return [`RuntimeError::ForbiddenTransition`](crate::RuntimeError) without
/// touching the view; failed side effects return the view error and leave
/// the state as it was.
#[derive(Debug)]
pub struct WidgetRuntime<V> {
    app_id: AppId,
    fsm: WidgetStateMachine,
    view: V,
    groups: ResourceGroupManager,
    pid: Pid,
    worker_pid: Option<Pid>,
}

impl<V: ViewBackend> WidgetRuntime<V> {
    /// Create a runtime for the process `pid` (and its worker).
    #[must_use]
    pub fn new(
        app_id: AppId,
        view: V,
        groups: ResourceGroupManager,
        pid: Pid,
        worker_pid: Option<Pid>,
    ) -> Self {
        Self {
            app_id,
            fsm: WidgetStateMachine::new(),
            view,
            groups,
            pid,
            worker_pid,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WidgetState {
        self.fsm.state()
    }

    /// Application this runtime hosts.
    #[must_use]
    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    /// The view backend.
    #[must_use]
    pub fn view(&self) -> &V {
        &self.view
    }

    /// The view backend, mutably. Bypasses the state machine.
    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    fn propose(&self, operation: Operation) -> RuntimeResult<Transition> {
        let proposal = self.fsm.allow(operation);
        if proposal.is_forbidden() {
            debug!(app_id = %self.app_id, state = %proposal.from(), %operation, "operation forbidden");
            return Err(proposal.forbidden_error());
        }
        Ok(proposal)
    }

    fn guarded<T>(
        &mut self,
        operation: Operation,
        effect: impl FnOnce(&mut V) -> ViewResult<T>,
    ) -> RuntimeResult<T> {
        let proposal = self.propose(operation)?;
        let value = effect(&mut self.view)?;
        self.fsm.commit(proposal)?;
        Ok(value)
    }

    /// Run pre-launch checks. `Ok(false)` means the launch was refused and
    /// the state did not change.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Prepared`, or the view error.
    pub fn check_before_launch(&mut self) -> RuntimeResult<bool> {
        let proposal = self.propose(Operation::CheckBeforeLaunch)?;
        if !self.view.check_before_launch()? {
            info!(app_id = %self.app_id, "launch check refused widget");
            return Ok(false);
        }
        self.fsm.commit(proposal)?;
        Ok(true)
    }

    /// Create the view and load `start_url`. `Ok(false)` means the view
    /// could not be prepared and the state did not change.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Initial`, or the view error.
    pub fn prepare_view(
        &mut self,
        start_url: &str,
        window: WindowHandle,
        context: ContextHandle,
        category: &str,
    ) -> RuntimeResult<bool> {
        let proposal = self.propose(Operation::PrepareView)?;
        if !self.view.prepare(start_url, window, context, category)? {
            return Ok(false);
        }
        self.fsm.commit(proposal)?;
        Ok(true)
    }

    /// Make the widget visible.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `SecurityChecked`, or the view
    /// error.
    pub fn show(&mut self) -> RuntimeResult<()> {
        self.guarded(Operation::Show, V::show)
    }

    /// Tear the widget down. `Hidden` is terminal.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` in `Initial` or `Hidden`, or the view
    /// error.
    pub fn hide(&mut self) -> RuntimeResult<()> {
        self.guarded(Operation::Hide, V::hide)?;
        info!(app_id = %self.app_id, "widget hidden");
        Ok(())
    }

    /// Move to the background, including the process's resource group.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Showed`, or the view error.
    pub fn suspend(&mut self) -> RuntimeResult<()> {
        self.guarded(Operation::Suspend, V::suspend)?;
        self.groups
            .move_best_effort(ResourceGroup::Background, self.pid, self.worker_pid);
        info!(app_id = %self.app_id, "widget suspended");
        Ok(())
    }

    /// Return from the background.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Suspended`, or the view error.
    pub fn resume(&mut self) -> RuntimeResult<()> {
        self.guarded(Operation::Resume, V::resume)?;
        self.groups
            .move_best_effort(ResourceGroup::Foreground, self.pid, self.worker_pid);
        info!(app_id = %self.app_id, "widget resumed");
        Ok(())
    }

    /// Reload the start URL. From `Suspended` this also resumes.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Showed` and `Suspended`, or the
    /// view error.
    pub fn reset(&mut self) -> RuntimeResult<()> {
        let from = self.state();
        self.guarded(Operation::Reset, V::reset)?;
        if from == WidgetState::Suspended {
            self.groups
                .move_best_effort(ResourceGroup::Foreground, self.pid, self.worker_pid);
        }
        info!(app_id = %self.app_id, "widget reset");
        Ok(())
    }

    /// The live webview handle. Allowed once the view is prepared,
    /// including after it was hidden.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` in `Initial`.
    pub fn current_webview(&self) -> RuntimeResult<Option<WebviewHandle>> {
        self.propose(Operation::GetCurrentWebview)?;
        Ok(self.view.current_webview())
    }

    /// Install embedder callbacks.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `SecurityChecked`, or the view
    /// error.
    pub fn set_user_delegates(&mut self, delegates: UserDelegates) -> RuntimeResult<()> {
        self.guarded(Operation::SetUserDelegates, |view| {
            view.set_user_delegates(delegates)
        })
    }

    /// Navigate back.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Showed`, or the view error.
    pub fn backward(&mut self) -> RuntimeResult<()> {
        self.guarded(Operation::Backward, V::backward)
    }

    /// Reload the current page.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Showed`, or the view error.
    pub fn reload(&mut self) -> RuntimeResult<()> {
        self.guarded(Operation::Reload, V::reload)
    }

    /// Dispatch a custom event into page script.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` outside `Showed`, or the view error.
    pub fn fire_javascript_event(&mut self, event: &str, data: &str) -> RuntimeResult<()> {
        self.guarded(Operation::FireJavascriptEvent, |view| {
            view.fire_javascript_event(event, data)
        })
    }
}
