//! JSON-file-backed store for per-repository `{current_commit,
//! previous_commit}`, read at the start of a reconciliation and
//! written at the end.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::RepoDeploymentState;

pub struct DeploymentStateStore {
  path: PathBuf,
}

impl DeploymentStateStore {
  pub fn new(state_dir: &std::path::Path) -> Self {
    DeploymentStateStore { path: state_dir.join("deployment-state.json") }
  }

  pub async fn load(
    &self,
  ) -> anyhow::Result<HashMap<String, RepoDeploymentState>> {
    match tokio::fs::read(&self.path).await {
      Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
      Err(e) => Err(e.into()),
    }
  }

  pub async fn save(
    &self,
    state: &HashMap<String, RepoDeploymentState>,
  ) -> anyhow::Result<()> {
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = self.path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &self.path).await?;
    Ok(())
  }

  /// Records a new current commit, shifting the old current into
  /// previous -- the move `--rollback` undoes.
  pub fn record_commit(
    state: &mut HashMap<String, RepoDeploymentState>,
    repo: &str,
    commit: String,
  ) {
    let entry = state.entry(repo.to_string()).or_default();
    if entry.current_commit.as_deref() != Some(commit.as_str()) {
      entry.previous_commit = entry.current_commit.take();
    }
    entry.current_commit = Some(commit);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = DeploymentStateStore::new(dir.path());
    let mut state = HashMap::new();
    DeploymentStateStore::record_commit(&mut state, "infra", "abc".into());
    store.save(&state).await.unwrap();

    let loaded = store.load().await.unwrap();
    assert_eq!(loaded["infra"].current_commit.as_deref(), Some("abc"));
    assert_eq!(loaded["infra"].previous_commit, None);
  }

  #[tokio::test]
  async fn missing_file_loads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = DeploymentStateStore::new(dir.path());
    let loaded = store.load().await.unwrap();
    assert!(loaded.is_empty());
  }

  #[test]
  fn record_commit_shifts_current_into_previous() {
    let mut state = HashMap::new();
    DeploymentStateStore::record_commit(&mut state, "infra", "abc".into());
    DeploymentStateStore::record_commit(&mut state, "infra", "def".into());
    assert_eq!(state["infra"].current_commit.as_deref(), Some("def"));
    assert_eq!(state["infra"].previous_commit.as_deref(), Some("abc"));
  }

  #[test]
  fn record_commit_is_noop_when_unchanged() {
    let mut state = HashMap::new();
    DeploymentStateStore::record_commit(&mut state, "infra", "abc".into());
    DeploymentStateStore::record_commit(&mut state, "infra", "abc".into());
    assert_eq!(state["infra"].previous_commit, None);
  }
}
