use thiserror::Error;

/// The failure taxonomy a reconciliation (or any single core
/// operation) can produce. Recoverable kinds are captured and tallied
/// by the sync engine; fatal kinds short-circuit the whole run.
#[derive(Debug, Error)]
pub enum CoreError {
  #[error("invalid configuration: {message}")]
  ConfigInvalid { message: String },

  #[error("git sync failed for repository '{repo}'")]
  GitSyncError {
    repo: String,
    #[source]
    source: anyhow::Error,
  },

  #[error("failed to parse compose project '{project}'")]
  ComposeParseError {
    project: String,
    #[source]
    source: anyhow::Error,
  },

  #[error("dependency validation failed for project '{project}'")]
  ValidationError {
    project: String,
    #[source]
    source: anyhow::Error,
  },

  #[error("artifact io failure at '{path}'")]
  ArtifactIoError {
    path: String,
    #[source]
    source: anyhow::Error,
  },

  #[error("lifecycle operation '{operation}' failed for service '{service}'")]
  LifecycleError {
    service: String,
    operation: String,
    #[source]
    source: anyhow::Error,
  },

  #[error("no renderer/lifecycle implementation for this host platform")]
  PlatformUnsupported,

  #[error("operation cancelled")]
  Cancelled,
}

impl CoreError {
  /// Fatal kinds short-circuit the reconciliation; everything else is
  /// tallied and the run continues.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      CoreError::ConfigInvalid { .. }
        | CoreError::PlatformUnsupported
        | CoreError::Cancelled
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn config_invalid_is_fatal() {
    assert!(
      CoreError::ConfigInvalid { message: "bad".into() }.is_fatal()
    );
  }

  #[test]
  fn git_sync_error_is_not_fatal() {
    let err = CoreError::GitSyncError {
      repo: "infra".into(),
      source: anyhow::anyhow!("network unreachable"),
    };
    assert!(!err.is_fatal());
  }
}
