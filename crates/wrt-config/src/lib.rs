#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for the WRT launch pipeline.
//!
//! # Usage
//!
//! ```rust,no_run
//! use wrt_config::Config;
//!
//! let resolved = Config::load().unwrap();
//! println!("pooling enabled: {}", resolved.config.launchpad.pool_enabled);
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **User** (`~/.wrt/config.toml`, or `$WRT_HOME/config.toml`)
//! 2. **System** (`/etc/wrt/config.toml`)
//! 3. **Environment variables** (`WRT_*`), fallback only
//! 4. **Embedded defaults** (`defaults.toml` compiled into binary)
//!
//! Command-line flags are applied on top by the binaries.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layered merging with per-field provenance.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ResolvedConfig;
pub use merge::ConfigLayer;
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load() -> ConfigResult<ResolvedConfig> {
        loader::load(None)
    }

    /// Load configuration reading the user layer from `home_dir/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any config file is malformed or the final
    /// configuration fails validation.
    pub fn load_with_home(home_dir: &std::path::Path) -> ConfigResult<ResolvedConfig> {
        loader::load(Some(home_dir))
    }

    /// Load configuration from a single file over the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
