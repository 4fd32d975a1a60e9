//! WRT Runtime - the launched widget's side of the pipeline.
//!
//! A widget's view moves through a guarded lifecycle:
//!
//! ```text
//! Initial ─prepare─▶ Prepared ─check─▶ SecurityChecked ─show─▶ Showed ◀─resume/reset─▶ Suspended
//!                        │                    │                  │                        │
//!                        └────────────────────┴──────hide────────┴────────────────────────┴──▶ Hidden
//! ```
//!
//! [`WidgetStateMachine`] owns the state and answers `allow` queries;
//! [`WidgetRuntime`] wraps a [`ViewBackend`] and applies each operation as
//! allow → side effect → commit. [`WidgetHost`] is the `widget-host` entry
//! point that candidates and cold launches run.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config_bridge;
pub mod error;
pub mod host;
pub mod prelude;
pub mod state;
pub mod view;
pub mod widget;

pub use error::{RuntimeError, RuntimeResult, ViewError, ViewResult};
pub use host::{HostCommand, WIDGET_HOST, WidgetHost, WidgetHostSettings, registry};
pub use state::{Operation, Outcome, Transition, WidgetState, WidgetStateMachine};
pub use view::{
    ContextHandle, HeadlessBackend, UserDelegates, ViewBackend, ViewEvent, WebviewHandle,
    WindowHandle,
};
pub use widget::WidgetRuntime;
