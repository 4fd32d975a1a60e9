//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound for any timer, one hour.
const MAX_TIMER_MS: u64 = 3_600_000;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_launchpad(config)?;
    validate_candidate(config)?;
    validate_reporter(config)?;
    validate_resource_groups(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn check_timer(field: &str, value: u64, allow_zero: bool) -> ConfigResult<()> {
    if value == 0 && !allow_zero {
        return Err(invalid(field, "must be greater than zero"));
    }
    if value > MAX_TIMER_MS {
        return Err(invalid(
            field,
            format!("{value} ms exceeds the {MAX_TIMER_MS} ms maximum"),
        ));
    }
    Ok(())
}

fn validate_launchpad(config: &Config) -> ConfigResult<()> {
    let l = &config.launchpad;
    check_timer("launchpad.request_timeout_ms", l.request_timeout_ms, false)?;
    check_timer("launchpad.replenish_fallback_ms", l.replenish_fallback_ms, false)?;
    check_timer("launchpad.respawn_delay_ms", l.respawn_delay_ms, true)?;

    if l.launch_socket.is_some() && l.launch_socket == l.pool_socket {
        return Err(invalid(
            "launchpad.pool_socket",
            "pool socket must differ from the launch socket",
        ));
    }
    Ok(())
}

fn validate_candidate(config: &Config) -> ConfigResult<()> {
    let c = &config.candidate;
    if !(-20..=19).contains(&c.nice) {
        return Err(invalid(
            "candidate.nice",
            format!("nice value {} is outside -20..=19", c.nice),
        ));
    }
    if c.default_entry_point.trim().is_empty() {
        return Err(invalid("candidate.default_entry_point", "must not be empty"));
    }
    if c.worker_command.first().is_some_and(|p| p.trim().is_empty()) {
        return Err(invalid("candidate.worker_command", "program must not be empty"));
    }
    Ok(())
}

fn validate_reporter(config: &Config) -> ConfigResult<()> {
    let r = &config.reporter;
    check_timer("reporter.delayed_timer_ms", r.delayed_timer_ms, false)?;
    check_timer("reporter.finished_timer_ms", r.finished_timer_ms, false)?;
    check_timer("runtime.display_delay_ms", config.runtime.display_delay_ms, true)?;
    Ok(())
}

fn validate_resource_groups(config: &Config) -> ConfigResult<()> {
    let g = &config.resource_groups;
    for (field, name) in [
        ("resource_groups.foreground", &g.foreground),
        ("resource_groups.background", &g.background),
    ] {
        if name.is_empty() || name.contains('/') || name == ".." {
            return Err(invalid(field, format!("'{name}' is not a valid cgroup name")));
        }
    }
    if g.foreground == g.background {
        return Err(invalid(
            "resource_groups.background",
            "foreground and background groups must differ",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.to_ascii_lowercase().as_str(),
        "error" | "warn" | "info" | "debug" | "trace" | "off"
    ) {
        return Err(invalid(
            "logging.level",
            format!("unsupported level '{}'", l.level),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json") {
        return Err(invalid(
            "logging.format",
            format!("unsupported format '{}'; expected pretty, compact or json", l.format),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_finished_timer_rejected() {
        let mut config = Config::default();
        config.reporter.finished_timer_ms = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("reporter.finished_timer_ms"));
    }

    #[test]
    fn test_nice_out_of_range_rejected() {
        let mut config = Config::default();
        config.candidate.nice = 40;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_socket_paths_rejected() {
        let mut config = Config::default();
        config.launchpad.launch_socket = Some("/tmp/wrt.sock".into());
        config.launchpad.pool_socket = Some("/tmp/wrt.sock".into());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_cgroup_names_must_be_plain() {
        let mut config = Config::default();
        config.resource_groups.background = "../escape".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert!(validate(&config).is_err());
    }
}
