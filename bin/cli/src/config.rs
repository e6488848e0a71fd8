//! Loads the YAML configuration file named on the command line. This
//! is the one place in the workspace that reads a config path off
//! disk; the core only ever sees the resulting [`quadsync_config::Config`].

use std::path::Path;

use anyhow::Context;
use quadsync_config::Config;

pub fn load(path: &Path) -> anyhow::Result<Config> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read config file '{}'", path.display()))?;
  serde_yaml_ng::from_str(&raw)
    .with_context(|| format!("failed to parse config file '{}'", path.display()))
}
