//! Git Syncer: clone-or-fast-forward a set of repositories and report
//! per-repo `{changed, commit, error}`, never aborting the batch on a
//! single repo's failure.

mod clone;
mod pull;
mod pull_or_clone;

pub use clone::clone;
pub use pull::pull;
pub use pull_or_clone::pull_or_clone;

use serde::{Deserialize, Serialize};

/// A configured repository to keep in sync. Name is unique across the
/// configuration and immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
  pub name: String,
  pub url: String,
  /// Branch, tag, or commit to check out.
  pub reference: String,
  /// Subdirectory (relative to the repo root) holding Compose projects.
  #[serde(default)]
  pub compose_subdir: String,
}

impl RepositoryDescriptor {
  pub fn path(&self, repo_root: &std::path::Path) -> std::path::PathBuf {
    repo_root.join(&self.name)
  }

  pub fn compose_dir(&self, repo_root: &std::path::Path) -> std::path::PathBuf {
    if self.compose_subdir.is_empty() {
      self.path(repo_root)
    } else {
      self.path(repo_root).join(&self.compose_subdir)
    }
  }
}

/// Outcome of syncing a single repository. Mirrors the "Sync result"
/// shape from the data model: `success=false` never aborts sibling
/// repos, it is carried as data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncOutcome {
  pub repository: String,
  pub success: bool,
  pub changed: bool,
  pub commit_hash: Option<String>,
  pub error: Option<String>,
}

impl SyncOutcome {
  fn ok(repository: &str, commit_hash: String, changed: bool) -> Self {
    SyncOutcome {
      repository: repository.to_string(),
      success: true,
      changed,
      commit_hash: Some(commit_hash),
      error: None,
    }
  }

  fn failed(repository: &str, error: impl std::fmt::Display) -> Self {
    SyncOutcome {
      repository: repository.to_string(),
      success: false,
      changed: false,
      commit_hash: None,
      error: Some(error.to_string()),
    }
  }
}

/// Reads `HEAD`'s commit hash from the repo at `path`.
async fn read_commit_hash(
  runner: &dyn quadsync_command::CommandRunner,
  path: &std::path::Path,
) -> anyhow::Result<String> {
  let output = quadsync_command::run_logged(
    runner,
    "read commit hash",
    Some(path),
    "git rev-parse HEAD",
  )
  .await;
  if !output.success {
    anyhow::bail!("failed to read commit hash: {}", output.stderr);
  }
  let hash = output.stdout.trim().to_string();
  if hash.is_empty() {
    anyhow::bail!("git rev-parse HEAD returned empty output");
  }
  Ok(hash)
}

#[cfg(test)]
mod tests {
  use super::*;
  use quadsync_command::{CommandOutput, FakeCommandRunner};

  fn repo() -> RepositoryDescriptor {
    RepositoryDescriptor {
      name: "infra".into(),
      url: "https://example.com/infra.git".into(),
      reference: "main".into(),
      compose_subdir: "compose".into(),
    }
  }

  #[test]
  fn compose_dir_joins_subdir() {
    let root = std::path::Path::new("/var/lib/quadsync/repos");
    let d = repo();
    assert_eq!(
      d.compose_dir(root),
      std::path::PathBuf::from("/var/lib/quadsync/repos/infra/compose")
    );
  }

  #[test]
  fn compose_dir_defaults_to_repo_root() {
    let root = std::path::Path::new("/var/lib/quadsync/repos");
    let mut d = repo();
    d.compose_subdir = String::new();
    assert_eq!(d.compose_dir(root), root.join("infra"));
  }

  #[tokio::test]
  async fn read_commit_hash_trims_output() {
    let fake = FakeCommandRunner::new();
    fake.script(
      "rev-parse",
      CommandOutput::ok("git rev-parse HEAD", "abc123\n"),
    );
    let hash =
      read_commit_hash(&fake, std::path::Path::new("/tmp/repo"))
        .await
        .unwrap();
    assert_eq!(hash, "abc123");
  }

  #[tokio::test]
  async fn read_commit_hash_errors_on_failure() {
    let fake = FakeCommandRunner::new();
    fake.script(
      "rev-parse",
      CommandOutput::err("git rev-parse HEAD", "not a git repo"),
    );
    let err =
      read_commit_hash(&fake, std::path::Path::new("/tmp/repo"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to read commit hash"));
  }
}
