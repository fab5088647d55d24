//! Configuration lookup for the counterpart CLI.

use anyhow::{Context, Result};
use counterpart_client::CounterpartConfig;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "counterpart.toml";

/// Load the configuration to run with.
///
/// An explicit path must exist. Without one, the per-user config file is used
/// when present, and the built-in defaults otherwise.
pub fn resolve(explicit: Option<&Path>) -> Result<CounterpartConfig> {
    if let Some(path) = explicit {
        return CounterpartConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()));
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            tracing::debug!("Using configuration {}", path.display());
            CounterpartConfig::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        _ => Ok(CounterpartConfig::default()),
    }
}

/// Per-user configuration file.
fn default_config_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "counterpart", "counterpart")?;
    Some(dirs.config_dir().join(CONFIG_FILE))
}
