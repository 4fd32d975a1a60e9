//! Configuration flowing into daemon and candidate settings.

use std::path::PathBuf;
use std::time::Duration;

use wrt_config::{Config, ConfigLayer};
use wrt_launchpad::{CandidateSettings, daemon};
use wrt_runtime::WidgetHostSettings;
use wrt_runtime::config_bridge;
use wrt_telemetry::LogFormat;

const USER_CONFIG: &str = r#"
[launchpad]
pool_enabled = false
launch_socket = "/run/test/launch.sock"
request_timeout_ms = 250

[candidate]
nice = 5

[reporter]
finished_timer_ms = 100

[logging]
format = "json"
"#;

#[test]
fn test_user_layer_reaches_every_component() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("config.toml"), USER_CONFIG).unwrap();

    let resolved = Config::load_with_home(home.path()).unwrap();
    let config = &resolved.config;
    assert_eq!(
        resolved.field_sources.get("launchpad.pool_enabled"),
        Some(&ConfigLayer::User)
    );

    let router = daemon::router_settings(config);
    assert_eq!(router.launch_socket, PathBuf::from("/run/test/launch.sock"));
    assert_eq!(router.pool_socket, None);
    assert_eq!(router.request_timeout, Duration::from_millis(250));
    assert!(!daemon::pool_settings(config).enabled);

    assert_eq!(CandidateSettings::from_config(config).nice, 5);
    assert_eq!(
        WidgetHostSettings::from_config(config).timers.finished,
        Duration::from_millis(100)
    );
    assert_eq!(config_bridge::to_log_config(config).format, LogFormat::Json);
}

#[test]
fn test_explicit_file_matches_layered_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, USER_CONFIG).unwrap();

    let explicit = config_bridge::load(Some(&path)).unwrap();
    let layered = Config::load_with_home(dir.path()).unwrap();
    assert_eq!(explicit.config.launchpad, layered.config.launchpad);
    assert_eq!(explicit.config.candidate, layered.config.candidate);
}
