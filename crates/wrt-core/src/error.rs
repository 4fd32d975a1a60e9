//! Error types shared by the launch pipeline crates.

use std::path::PathBuf;

use thiserror::Error;

use crate::resource::ResourceGroup;

/// Errors shared by the launch pipeline crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An application identifier failed validation.
    #[error("Invalid application id: {0}")]
    InvalidAppId(String),

    /// A launch request could not be encoded or decoded.
    #[error("Malformed launch request: {0}")]
    MalformedRequest(#[from] serde_json::Error),

    /// Writing a process into a resource group failed.
    #[error("Failed to move pid {pid} into {group} group at {path}: {source}")]
    ResourceGroup {
        /// Process that was being moved.
        pid: i32,
        /// Target group.
        group: ResourceGroup,
        /// Control file that rejected the write.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A specialized Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
