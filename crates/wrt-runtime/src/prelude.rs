//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wrt_runtime::prelude::*;` to import all essential types.

pub use crate::{RuntimeError, RuntimeResult, ViewError, ViewResult};

pub use crate::{Operation, WidgetRuntime, WidgetState, WidgetStateMachine};

pub use crate::{HeadlessBackend, UserDelegates, ViewBackend, ViewEvent};

pub use crate::{WidgetHost, WidgetHostSettings};
