//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wrt_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Launch types
pub use crate::{AppId, LaunchRequest, LaunchStatus, Pid, RequestKind};

// Resource groups
pub use crate::{ResourceGroup, ResourceGroupManager};
