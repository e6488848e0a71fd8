use std::path::Path;

use quadsync_command::{CommandRunner, run_logged};

use crate::{RepositoryDescriptor, SyncOutcome, read_commit_hash};

/// Fast-forwards an already-cloned repository to the configured
/// reference, handling the case where the user (or a previous sync)
/// left the remote or checked-out branch different than expected.
pub async fn pull(
  descriptor: &RepositoryDescriptor,
  repo_root: &Path,
  previous_commit: Option<&str>,
  runner: &dyn CommandRunner,
) -> SyncOutcome {
  let path = descriptor.path(repo_root);

  let set_remote_cmd =
    format!("git remote set-url origin {}", descriptor.url);
  let set_remote_out =
    run_logged(runner, "set remote", Some(&path), &set_remote_cmd).await;
  if !set_remote_out.success {
    return SyncOutcome::failed(
      &descriptor.name,
      format!("failed to set remote: {}", set_remote_out.stderr),
    );
  }

  let fetch_out =
    run_logged(runner, "fetch", Some(&path), "git fetch --all --tags origin")
      .await;
  if !fetch_out.success {
    return SyncOutcome::failed(
      &descriptor.name,
      format!("git fetch failed: {}", fetch_out.stderr),
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

  let reset_cmd = format!("git reset --hard {}", descriptor.reference);
  let reset_out =
    run_logged(runner, "fast-forward", Some(&path), &reset_cmd).await;
  if !reset_out.success {
    return SyncOutcome::failed(
      &descriptor.name,
      format!("git reset --hard failed: {}", reset_out.stderr),
    );
  }

  match read_commit_hash(runner, &path).await {
    Ok(hash) => {
      let changed = previous_commit != Some(hash.as_str());
      SyncOutcome::ok(&descriptor.name, hash, changed)
    }
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
  async fn unchanged_commit_reports_changed_false() {
    let runner = FakeCommandRunner::new();
    runner.script("rev-parse", CommandOutput::ok("git rev-parse HEAD", "abc\n"));
    let dir = tempfile::tempdir().unwrap();
    let outcome =
      pull(&descriptor(), dir.path(), Some("abc"), &runner).await;
    assert!(outcome.success);
    assert!(!outcome.changed);
  }

  #[tokio::test]
  async fn new_commit_reports_changed_true() {
    let runner = FakeCommandRunner::new();
    runner.script("rev-parse", CommandOutput::ok("git rev-parse HEAD", "def\n"));
    let dir = tempfile::tempdir().unwrap();
    let outcome =
      pull(&descriptor(), dir.path(), Some("abc"), &runner).await;
    assert!(outcome.success);
    assert!(outcome.changed);
  }

  #[tokio::test]
  async fn first_ever_pull_with_no_previous_commit_is_changed() {
    let runner = FakeCommandRunner::new();
    runner.script("rev-parse", CommandOutput::ok("git rev-parse HEAD", "abc\n"));
    let dir = tempfile::tempdir().unwrap();
    let outcome = pull(&descriptor(), dir.path(), None, &runner).await;
    assert!(outcome.changed);
  }

  #[tokio::test]
  async fn fetch_failure_does_not_panic_and_is_reported() {
    let runner = FakeCommandRunner::new();
    runner.script("fetch", CommandOutput::err("git fetch", "network unreachable"));
    let dir = tempfile::tempdir().unwrap();
    let outcome =
      pull(&descriptor(), dir.path(), Some("abc"), &runner).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("network unreachable"));
  }
}
