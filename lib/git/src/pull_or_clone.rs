use std::path::Path;

use quadsync_command::CommandRunner;

use crate::{RepositoryDescriptor, SyncOutcome};

/// Clones the repository if it has never been synced locally,
/// otherwise fast-forwards the existing clone. Callers don't need to
/// know which path was taken; [`SyncOutcome`] reports the result
/// uniformly either way.
pub async fn pull_or_clone(
  descriptor: &RepositoryDescriptor,
  repo_root: &Path,
  previous_commit: Option<&str>,
  runner: &dyn CommandRunner,
) -> SyncOutcome {
  let git_dir = descriptor.path(repo_root).join(".git");
  if git_dir.exists() {
    crate::pull(descriptor, repo_root, previous_commit, runner).await
  } else {
    crate::clone(descriptor, repo_root, runner).await
  }
}
