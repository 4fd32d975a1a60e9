//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that no
//! config file set. Command-line flags are applied by the binaries after
//! loading and win over everything.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources};

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// All supported `WRT_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "WRT_POOL_ENABLED",
        field_path: "launchpad.pool_enabled",
    },
    EnvMapping {
        var_name: "WRT_LAUNCH_SOCKET",
        field_path: "launchpad.launch_socket",
    },
    EnvMapping {
        var_name: "WRT_POOL_SOCKET",
        field_path: "launchpad.pool_socket",
    },
    EnvMapping {
        var_name: "WRT_ENTRY_POINT",
        field_path: "candidate.default_entry_point",
    },
    EnvMapping {
        var_name: "WRT_DELAYED_TIMER_MS",
        field_path: "reporter.delayed_timer_ms",
    },
    EnvMapping {
        var_name: "WRT_FINISHED_TIMER_MS",
        field_path: "reporter.finished_timer_ms",
    },
    EnvMapping {
        var_name: "WRT_DISPLAY_DELAY_MS",
        field_path: "runtime.display_delay_ms",
    },
    EnvMapping {
        var_name: "WRT_LOG_LEVEL",
        field_path: "logging.level",
    },
];

/// Apply environment variable fallbacks to fields that were **not** set by
/// any config file layer.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        let set_by_file = sources
            .get(mapping.field_path)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );

            set_field(merged, mapping.field_path, coerce_to_toml_value(mapping.field_path, val));
            sources.insert(mapping.field_path.to_owned(), ConfigLayer::Environment);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Set a dotted field in the TOML tree, creating intermediate tables.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut segments = path.split('.').peekable();
    let mut current = root;

    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

/// Coerce a string env var value to the TOML type of the target field.
fn coerce_to_toml_value(path: &str, val: &str) -> toml::Value {
    if path.ends_with("_ms")
        && let Ok(i) = val.parse::<i64>()
    {
        return toml::Value::Integer(i);
    }

    if path == "launchpad.pool_enabled" {
        match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => return toml::Value::Boolean(true),
            "0" | "false" | "no" | "off" => return toml::Value::Boolean(false),
            _ => {},
        }
    }

    toml::Value::String(val.to_owned())
}

/// Collect all current environment variables into a map.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}
