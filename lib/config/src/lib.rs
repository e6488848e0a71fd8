//! Configuration shapes shared between the CLI adapter and the core.
//!
//! Loading these from a file or environment is the CLI's job; this
//! crate only defines what a valid configuration looks like.

use serde::{Deserialize, Serialize};

/// Root configuration: the set of repositories to track plus the
/// daemon and platform settings that apply to all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub repositories: Vec<RepositoryConfig>,
  #[serde(default)]
  pub daemon: DaemonConfig,
  #[serde(default)]
  pub platform: PlatformConfig,
  #[serde(default)]
  pub logging: LogConfig,
  /// Where repositories are checked out.
  pub repository_dir: String,
  /// Where deployment state (current/previous commit per repo) lives.
  pub state_dir: String,
  /// Base directory the active platform's artifacts are written under:
  /// `{artifact_dir}/containers/systemd` on Linux, `{artifact_dir}`
  /// itself on macOS (point this at `~/Library/LaunchAgents`).
  pub artifact_dir: String,
}

/// One tracked repository, as declared in configuration. Mirrors
/// `quadsync_git::RepositoryDescriptor` but lives here so the CLI can
/// deserialize it without depending on the git crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
  pub name: String,
  pub url: String,
  pub reference: String,
  #[serde(default)]
  pub compose_subdir: String,
}

/// Daemon loop tuning: ticker interval and failure backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  pub sync_interval_secs: u64,
  pub max_backoff_secs: u64,
  pub watchdog_interval_secs: u64,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    DaemonConfig {
      sync_interval_secs: 300,
      max_backoff_secs: 1800,
      watchdog_interval_secs: 30,
    }
  }
}

/// Back-end selection and naming conventions. `backend` is normally
/// left unset and inferred from the host OS; setting it is mostly
/// useful for tests that want to force one renderer on any host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
  pub backend: Option<PlatformBackend>,
  pub launchd_label_prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformBackend {
  SystemdQuadlet,
  LaunchdPlist,
}

/// Verbosity for [`StdioLogMode`], independent of the format the logs
/// are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Trace,
  Debug,
  #[default]
  Info,
  Warn,
  Error,
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Trace => tracing::Level::TRACE,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Error => tracing::Level::ERROR,
    }
  }
}

/// How the logger crate should render stdout output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}

/// Logger configuration, independent of which binary initializes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  pub level: LogLevel,
  pub stdio: StdioLogMode,
  pub pretty: bool,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn daemon_config_defaults_match_backoff_spec() {
    let d = DaemonConfig::default();
    assert_eq!(d.sync_interval_secs, 300);
    assert_eq!(d.max_backoff_secs, 1800);
    assert_eq!(d.watchdog_interval_secs, 30);
  }

  #[test]
  fn config_deserializes_minimal_yaml_like_json() {
    let json = r#"{
      "repository_dir": "/var/lib/quadsync/repos",
      "state_dir": "/var/lib/quadsync/state",
      "artifact_dir": "/var/lib/quadsync",
      "repositories": [
        {"name": "infra", "url": "https://example.com/infra.git", "reference": "main"}
      ]
    }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.repositories.len(), 1);
    assert_eq!(config.daemon.sync_interval_secs, 300);
  }
}
