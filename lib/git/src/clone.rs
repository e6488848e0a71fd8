use std::path::Path;

use quadsync_command::{CommandRunner, run_logged};

use crate::{RepositoryDescriptor, SyncOutcome, read_commit_hash};

/// Clones a repository fresh into `repo_root/{name}`, deleting any
/// stale directory first, then checks out the configured reference.
pub async fn clone(
  descriptor: &RepositoryDescriptor,
  repo_root: &Path,
  runner: &dyn CommandRunner,
) -> SyncOutcome {
  let path = descriptor.path(repo_root);
  let _ = tokio::fs::remove_dir_all(&path).await;

  if let Some(parent) = path.parent() {
    if let Err(e) = tokio::fs::create_dir_all(parent).await {
      return SyncOutcome::failed(
        &descriptor.name,
        format!("failed to create repo parent directory: {e}"),
      );
    }
  }

  let clone_cmd =
    format!("git clone {} {}", descriptor.url, path.display());
  let clone_out =
    run_logged(runner, "clone repo", None, &clone_cmd).await;
  if !clone_out.success {
    return SyncOutcome::failed(
      &descriptor.name,
      format!("git clone failed: {}", clone_out.stderr),
    );
  }

  let checkout_cmd = format!("git checkout -f {}", descriptor.reference);
  let checkout_out =
    run_logged(runner, "checkout reference", Some(&path), &checkout_cmd)
      .await;
  if !checkout_out.success {
    return SyncOutcome::failed(
      &descriptor.name,
      format!(
        "failed to checkout {}: {}",
        descriptor.reference, checkout_out.stderr
      ),
    );
  }

  match read_commit_hash(runner, &path).await {
    Ok(hash) => SyncOutcome::ok(&descriptor.name, hash, true),
    Err(e) => SyncOutcome::failed(&descriptor.name, e),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use quadsync_command::{CommandOutput, FakeCommandRunner};

  fn descriptor() -> RepositoryDescriptor {
    RepositoryDescriptor {
      name: "infra".into(),
      url: "https://example.com/infra.git".into(),
      reference: "main".into(),
      compose_subdir: String::new(),
    }
  }

  #[tokio::test]
  async fn successful_clone_reports_changed() {
    let runner = FakeCommandRunner::new();
    runner.script("rev-parse", CommandOutput::ok("git rev-parse HEAD", "deadbeef\n"));
    let dir = tempfile::tempdir().unwrap();
    let outcome = clone(&descriptor(), dir.path(), &runner).await;
    assert!(outcome.success);
    assert!(outcome.changed);
    assert_eq!(outcome.commit_hash.as_deref(), Some("deadbeef"));
    assert_eq!(runner.call_count_containing("git clone"), 1);
  }

  #[tokio::test]
  async fn failed_clone_is_reported_without_aborting() {
    let runner = FakeCommandRunner::new();
    runner.script("git clone", CommandOutput::err("git clone", "auth failed"));
    let dir = tempfile::tempdir().unwrap();
    let outcome = clone(&descriptor(), dir.path(), &runner).await;
    assert!(!outcome.success);
    assert!(!outcome.changed);
    assert!(outcome.error.unwrap().contains("auth failed"));
  }

  #[tokio::test]
  async fn checkout_failure_is_reported() {
    let runner = FakeCommandRunner::new();
    runner.script(
      "checkout",
      CommandOutput::err("git checkout -f main", "reference not found"),
    );
    let dir = tempfile::tempdir().unwrap();
    let outcome = clone(&descriptor(), dir.path(), &runner).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("reference not found"));
  }
}
