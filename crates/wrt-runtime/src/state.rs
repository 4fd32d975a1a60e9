//! Guarded lifecycle state machine for a widget's view.
//!
//! Every public operation goes through two phases. [`WidgetStateMachine::allow`]
//! is a pure query that returns a [`Transition`] proposal; the caller then
//! performs the side effect and, only if it succeeded, hands the proposal to
//! [`WidgetStateMachine::commit`]. A forbidden proposal never reaches the
//! side effect, and a failed side effect never reaches commit, so the state
//! only changes when the view actually did what the state claims.

use std::fmt;

use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};

/// Lifecycle state of a widget view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WidgetState {
    /// Nothing prepared yet.
    Initial,
    /// View created and start URL loaded.
    Prepared,
    /// Launch checks passed.
    SecurityChecked,
    /// Visible and running.
    Showed,
    /// Running in the background.
    Suspended,
    /// Torn down. Terminal.
    Hidden,
}

impl WidgetState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Initial,
        Self::Prepared,
        Self::SecurityChecked,
        Self::Showed,
        Self::Suspended,
        Self::Hidden,
    ];
}

impl fmt::Display for WidgetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initial => "initial",
            Self::Prepared => "prepared",
            Self::SecurityChecked => "security-checked",
            Self::Showed => "showed",
            Self::Suspended => "suspended",
            Self::Hidden => "hidden",
        })
    }
}

/// An operation on the widget runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create the view and load the start URL.
    PrepareView,
    /// Run pre-launch checks.
    CheckBeforeLaunch,
    /// Make the widget visible.
    Show,
    /// Tear the widget down.
    Hide,
    /// Move to the background.
    Suspend,
    /// Return from the background.
    Resume,
    /// Reload the start URL.
    Reset,
    /// Query the current webview.
    GetCurrentWebview,
    /// Install embedder callbacks.
    SetUserDelegates,
    /// Navigate back.
    Backward,
    /// Reload the current page.
    Reload,
    /// Dispatch a custom event into page script.
    FireJavascriptEvent,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Self; 12] = [
        Self::PrepareView,
        Self::CheckBeforeLaunch,
        Self::Show,
        Self::Hide,
        Self::Suspend,
        Self::Resume,
        Self::Reset,
        Self::GetCurrentWebview,
        Self::SetUserDelegates,
        Self::Backward,
        Self::Reload,
        Self::FireJavascriptEvent,
    ];
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PrepareView => "prepare-view",
            Self::CheckBeforeLaunch => "check-before-launch",
            Self::Show => "show",
            Self::Hide => "hide",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Reset => "reset",
            Self::GetCurrentWebview => "get-current-webview",
            Self::SetUserDelegates => "set-user-delegates",
            Self::Backward => "backward",
            Self::Reload => "reload",
            Self::FireJavascriptEvent => "fire-javascript-event",
        })
    }
}

/// What committing a proposal would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Allowed, state stays.
    NoChange,
    /// Allowed, state becomes the given one.
    MoveTo(WidgetState),
    /// Not allowed.
    Forbidden,
}

/// A proposal returned by [`WidgetStateMachine::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    from: WidgetState,
    operation: Operation,
    outcome: Outcome,
}

impl Transition {
    /// State the proposal was made in.
    #[must_use]
    pub fn from(&self) -> WidgetState {
        self.from
    }

    /// Proposed operation.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Proposed outcome.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Whether the operation is forbidden.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.outcome == Outcome::Forbidden
    }

    /// Error to return when the proposal is forbidden.
    #[must_use]
    pub fn forbidden_error(&self) -> RuntimeError {
        RuntimeError::ForbiddenTransition {
            state: self.from,
            operation: self.operation,
        }
    }
}

/// The transition table.
#[must_use]
pub fn outcome(state: WidgetState, operation: Operation) -> Outcome {
    use Operation as Op;
    use WidgetState as S;

    match (state, operation) {
        (
            S::Prepared | S::SecurityChecked | S::Showed | S::Suspended | S::Hidden,
            Op::GetCurrentWebview,
        ) => Outcome::NoChange,

        (S::Initial, Op::PrepareView) => Outcome::MoveTo(S::Prepared),

        (S::Prepared, Op::CheckBeforeLaunch) => Outcome::MoveTo(S::SecurityChecked),

        (S::SecurityChecked, Op::Show) => Outcome::MoveTo(S::Showed),
        (S::SecurityChecked, Op::SetUserDelegates) => Outcome::NoChange,

        (S::Showed, Op::Suspend) => Outcome::MoveTo(S::Suspended),
        (S::Showed, Op::Reset | Op::Backward | Op::Reload | Op::FireJavascriptEvent) => {
            Outcome::NoChange
        },

        (S::Suspended, Op::Resume | Op::Reset) => Outcome::MoveTo(S::Showed),

        (S::Prepared | S::SecurityChecked | S::Showed | S::Suspended, Op::Hide) => {
            Outcome::MoveTo(S::Hidden)
        },

        _ => Outcome::Forbidden,
    }
}

/// Owner of the current [`WidgetState`].
#[derive(Debug)]
pub struct WidgetStateMachine {
    state: WidgetState,
}

impl Default for WidgetStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetStateMachine {
    /// A machine in [`WidgetState::Initial`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: WidgetState::Initial,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WidgetState {
        self.state
    }

    /// Propose `operation` from the current state. Pure.
    #[must_use]
    pub fn allow(&self, operation: Operation) -> Transition {
        Transition {
            from: self.state,
            operation,
            outcome: outcome(self.state, operation),
        }
    }

    /// Apply a proposal whose side effect succeeded. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ForbiddenTransition`] for a forbidden proposal
    /// and [`RuntimeError::StaleProposal`] if the state changed since the
    /// proposal was made. The state is unchanged in both cases.
    pub fn commit(&mut self, proposal: Transition) -> RuntimeResult<WidgetState> {
        if proposal.from != self.state {
            return Err(RuntimeError::StaleProposal {
                operation: proposal.operation,
                proposed: proposal.from,
                current: self.state,
            });
        }
        match proposal.outcome {
            Outcome::Forbidden => Err(proposal.forbidden_error()),
            Outcome::NoChange => Ok(self.state),
            Outcome::MoveTo(next) => {
                debug!(from = %self.state, to = %next, operation = %proposal.operation, "widget state changed");
                self.state = next;
                Ok(next)
            },
        }
    }
}
