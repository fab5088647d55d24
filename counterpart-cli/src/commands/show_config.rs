//! Config command - print the effective configuration.

use anyhow::{Context, Result};
use counterpart_client::CounterpartConfig;

/// Print `config` as pretty JSON.
pub fn run(config: &CounterpartConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("{}", json);
    Ok(())
}
