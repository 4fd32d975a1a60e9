//! `wrt config`: inspect the resolved configuration.

use anyhow::{Result, bail};
use colored::Colorize;
use wrt_config::ResolvedConfig;

use crate::theme::Theme;

/// Print the resolved configuration followed by where each field came from.
pub(crate) fn show_config(resolved: &ResolvedConfig, format: &str) -> Result<()> {
    let rendered = match format {
        "toml" => resolved.config.to_toml()?,
        "json" => serde_json::to_string_pretty(&resolved.config)?,
        other => bail!("unknown format '{other}'; expected toml or json"),
    };

    println!("{}", Theme::header("Resolved configuration"));
    println!("{}", Theme::separator());
    println!("{rendered}");

    if resolved.loaded_files.is_empty() {
        println!("{}", Theme::dimmed("no config files found, using defaults"));
    } else {
        println!("{}", Theme::header("Loaded files"));
        for file in &resolved.loaded_files {
            println!("  {file}");
        }
    }

    if !resolved.field_sources.is_empty() {
        println!("{}", Theme::header("Field sources"));
        let mut fields: Vec<_> = resolved.field_sources.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        for (field, layer) in fields {
            println!("  {field} {}", format!("({layer:?})").dimmed());
        }
    }
    Ok(())
}
