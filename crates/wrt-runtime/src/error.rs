//! View and widget runtime error types.

use thiserror::Error;

use crate::state::{Operation, WidgetState};

/// Failure of a view side effect.
#[derive(Debug, Error)]
pub enum ViewError {
    /// The engine rejected the call.
    #[error("View backend failed during {operation}: {message}")]
    Backend {
        /// Operation whose side effect failed.
        operation: Operation,
        /// Engine message.
        message: String,
    },

    /// The view has not been prepared yet.
    #[error("No view has been prepared")]
    NotPrepared,
}

/// Result alias for view backends.
pub type ViewResult<T> = Result<T, ViewError>;

/// Errors from the widget runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The operation is not allowed in the current state. Nothing happened.
    #[error("{operation} is not allowed in state {state}")]
    ForbiddenTransition {
        /// State at the time of the call.
        state: WidgetState,
        /// Rejected operation.
        operation: Operation,
    },

    /// The side effect failed. The state is unchanged.
    #[error(transparent)]
    View(#[from] ViewError),

    /// A proposal was committed after the state moved on.
    #[error("Stale proposal for {operation}: proposed in {proposed}, current state is {current}")]
    StaleProposal {
        /// Operation of the proposal.
        operation: Operation,
        /// State the proposal was made in.
        proposed: WidgetState,
        /// State at commit time.
        current: WidgetState,
    },

    /// The widget refused to launch (prepare or security check returned false).
    #[error("Widget refused to launch at {0}")]
    LaunchRefused(Operation),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
