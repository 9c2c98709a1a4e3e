//! Show the effective configuration.

use std::path::Path;

use tilewatch::config::TilewatchConfig;

use super::common::load_config;
use crate::error::CliError;

/// Print the configuration that `simulate` would run with.
pub fn run(path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(path)?;
    match path {
        Some(path) => println!("Configuration: {}", path.display()),
        None => println!("Configuration: built-in defaults"),
    }
    print!("{}", render(&config));
    Ok(())
}

fn render(config: &TilewatchConfig) -> String {
    let max_events = match config.dispatch.max_events_per_pass {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };
    let directory = config
        .logging
        .directory
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "(console only)".to_string());

    format!(
        "[callbacks]\n  duplicate_policy    = {}\n\
         [dispatch]\n  coalesce_removals   = {}\n  max_events_per_pass = {}\n\
         [logging]\n  level               = {}\n  directory           = {}\n",
        config.duplicate_policy,
        config.dispatch.coalesce_removals,
        max_events,
        config.logging.level,
        directory,
    )
}
