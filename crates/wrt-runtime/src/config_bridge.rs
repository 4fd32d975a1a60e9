//! Bridge from [`wrt_config::Config`] to the types the binaries set up.

use std::path::Path;

use wrt_config::{Config, ConfigResult, ResolvedConfig};
use wrt_telemetry::{LogConfig, LogFormat};

/// Convert config to [`LogConfig`].
///
/// An unknown format falls back to compact; validation already rejects it
/// for files loaded through [`load`].
#[must_use]
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = cfg
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or(LogFormat::Compact);

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Load the layered configuration, or a single file when `explicit` is set.
///
/// An explicit file replaces the system and user layers. Its fields are not
/// tracked individually; the file is reported in `loaded_files`.
///
/// # Errors
///
/// Returns a config error if a file is malformed or fails validation, or if
/// `explicit` does not exist.
pub fn load(explicit: Option<&Path>) -> ConfigResult<ResolvedConfig> {
    match explicit {
        Some(path) => Ok(ResolvedConfig {
            config: Config::load_file(path)?,
            field_sources: wrt_config::merge::FieldSources::new(),
            loaded_files: vec![path.display().to_string()],
        }),
        None => Config::load(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_follows_logging_section() {
        let mut config = Config::default();
        config.logging.level = "debug".to_owned();
        config.logging.format = "json".to_owned();
        config.logging.directives = vec!["wrt_launchpad=trace".to_owned()];

        let log = to_log_config(&config);
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.directives, vec!["wrt_launchpad=trace".to_owned()]);
    }

    #[test]
    fn test_unknown_format_is_compact() {
        let mut config = Config::default();
        config.logging.format = "fancy".to_owned();
        assert_eq!(to_log_config(&config).format, LogFormat::Compact);
    }

    #[test]
    fn test_explicit_file_replaces_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrt.toml");
        std::fs::write(&path, "[launchpad]\npool_enabled = false\n").unwrap();

        let resolved = load(Some(&path)).unwrap();
        assert!(!resolved.config.launchpad.pool_enabled);
        assert!(resolved.field_sources.is_empty());
        assert_eq!(resolved.loaded_files, vec![path.display().to_string()]);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
