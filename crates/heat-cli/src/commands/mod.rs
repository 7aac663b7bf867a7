//! Subcommand implementations.

pub mod compare;
pub mod grid;
pub mod run;
pub mod validate;

use anyhow::Context;
use heat_types::config::HeatConfig;
use std::path::Path;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<HeatConfig> {
    HeatConfig::from_file(&path.to_string_lossy())
        .with_context(|| format!("failed to load configuration {}", path.display()))
}
