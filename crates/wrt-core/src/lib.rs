//! WRT Core - shared types for the widget launch pipeline.
//!
//! Everything that crosses a process boundary between the launchpad daemon,
//! warm candidates and launched widgets lives here: application ids, launch
//! requests, launch status codes, and resource group placement.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod app;
pub mod error;
pub mod prelude;
pub mod request;
pub mod resource;

pub use app::AppId;
pub use error::{CoreError, CoreResult};
pub use nix::unistd::Pid;
pub use request::{ENTRY_POINT_ARG, LaunchRequest, LaunchStatus, RequestKind};
pub use resource::{
    CgroupBackend, LoggingBackend, ResourceGroup, ResourceGroupBackend, ResourceGroupManager,
};
