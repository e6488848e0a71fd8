//! Orchestrates one reconciliation: git sync, compose processing,
//! rendering, validation, artifact writes, and supervisor calls, in
//! the load-bearing order from the concurrency design.
//!
//! A cancellation that arrives mid-reconciliation aborts at the next
//! checkpoint below: the in-flight atomic artifact write is allowed to
//! complete, but no subsequent reload, restart, start, or stop call is
//! ever issued.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use quadsync_command::CommandRunner;
use quadsync_git::RepositoryDescriptor;
use tokio_util::sync::CancellationToken;

use crate::artifact_store::ArtifactStore;
use crate::compose::{self, ComposeLoader};
use crate::error::CoreError;
use crate::platform::{Lifecycle, Renderer};
use crate::state::DeploymentStateStore;
use crate::types::{RepoDeploymentState, ServiceSpec};
use crate::validator;

/// Narrows a reconciliation to a subset of repos and/or a
/// non-default mode. Mirrors the CLI's `sync` flags.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
  pub repo_filter: Option<String>,
  pub force: bool,
  pub dry_run: bool,
  pub rollback: bool,
}

#[derive(Debug, Default)]
pub struct SyncReport {
  pub repo_outcomes: Vec<quadsync_git::SyncOutcome>,
  pub warnings: Vec<String>,
  pub failures: Vec<String>,
  pub artifacts_written: usize,
  pub services_started: Vec<String>,
  pub services_restarted: Vec<String>,
  pub services_stopped: Vec<String>,
  pub dry_run: bool,
}

impl SyncReport {
  pub fn success(&self) -> bool {
    self.failures.is_empty()
  }
}

pub struct SyncEngine<'a> {
  pub repo_root: PathBuf,
  pub command_runner: &'a dyn CommandRunner,
  pub compose_loader: &'a dyn ComposeLoader,
  pub renderer: &'a dyn Renderer,
  pub lifecycle: &'a dyn Lifecycle,
  pub artifact_store: &'a ArtifactStore,
  pub state_store: &'a DeploymentStateStore,
}

impl<'a> SyncEngine<'a> {
  pub async fn reconcile(
    &self,
    repositories: &[RepositoryDescriptor],
    options: &SyncOptions,
    cancellation: &CancellationToken,
  ) -> Result<SyncReport, CoreError> {
    if cancellation.is_cancelled() {
      return Err(CoreError::Cancelled);
    }

    let mut state = self
      .state_store
      .load()
      .await
      .map_err(|source| CoreError::ConfigInvalid {
        message: format!("failed to load deployment state: {source}"),
      })?;

    let selected = select_repositories(repositories, options)?;

    let mut report = SyncReport { dry_run: options.dry_run, ..Default::default() };
    let mut changed_projects = Vec::new();

    for repo in &selected {
      if cancellation.is_cancelled() {
        return Err(CoreError::Cancelled);
      }

      let previous = state.get(&repo.name).and_then(|s| s.current_commit.clone());
      let outcome = if options.rollback {
        let previous_commit = state
          .get(&repo.name)
          .and_then(|s| s.previous_commit.clone())
          .ok_or_else(|| CoreError::ConfigInvalid {
            message: format!(
              "repository '{}' has no previous commit to roll back to",
              repo.name
            ),
          })?;
        let mut rollback_repo = repo.clone();
        rollback_repo.reference = previous_commit;
        quadsync_git::pull_or_clone(
          &rollback_repo,
          &self.repo_root,
          previous.as_deref(),
          self.command_runner,
        )
        .await
      } else {
        quadsync_git::pull_or_clone(
          repo,
          &self.repo_root,
          previous.as_deref(),
          self.command_runner,
        )
        .await
      };

      if !outcome.success {
        report.failures.push(format!(
          "git-sync-error: repository '{}': {}",
          repo.name,
          outcome.error.as_deref().unwrap_or("unknown error")
        ));
        report.repo_outcomes.push(outcome);
        continue;
      }

      if let Some(hash) = &outcome.commit_hash {
        DeploymentStateStore::record_commit(
          &mut state,
          &repo.name,
          hash.clone(),
        );
      }

      if outcome.changed || options.force {
        let compose_dir = repo.compose_dir(&self.repo_root);
        match self.compose_loader.load(&compose_dir) {
          Ok(projects) => changed_projects.extend(projects),
          Err(source) => report.failures.push(format!(
            "compose-parse-error: repository '{}': {source}",
            repo.name
          )),
        }
      }

      report.repo_outcomes.push(outcome);
    }

    if cancellation.is_cancelled() {
      return Err(CoreError::Cancelled);
    }

    let mut batch: Vec<ServiceSpec> = Vec::new();
    let mut processed_project_names: HashSet<String> = HashSet::new();

    for project in &changed_projects {
      match compose::process(project) {
        Ok(mut specs) => {
          processed_project_names.insert(project.name.clone());
          match validator::validate(
            &mut specs,
            self.renderer,
            self.lifecycle,
            self.command_runner,
          )
          .await
          {
            Ok(validation) => {
              report.warnings.extend(validation.warnings);
              batch.extend(specs);
            }
            Err(source) => report.failures.push(format!(
              "validation-error: project '{}': {source}",
              project.name
            )),
          }
        }
        Err(source) => report.failures.push(format!(
          "compose-parse-error: project '{}': {source}",
          project.name
        )),
      }
    }

    let existing = self.artifact_store.list().await.map_err(|source| {
      CoreError::ArtifactIoError { path: "<root>".into(), source }
    })?;

    let render = self.renderer.render(&batch, &existing);

    let emitted_paths: HashSet<PathBuf> =
      render.artifacts.iter().map(|a| a.path.clone()).collect();
    let obsolete: Vec<PathBuf> = existing
      .keys()
      .filter(|path| {
        !emitted_paths.contains(*path)
          && artifact_belongs_to_processed_project(
            path,
            &processed_project_names,
          )
      })
      .cloned()
      .collect();

    if options.dry_run {
      for (name, change) in &render.service_changes {
        if change.changed {
          report.warnings.push(format!("would write artifacts for '{name}'"));
        }
      }
      for path in &obsolete {
        report.warnings.push(format!("would delete '{}'", path.display()));
      }
      self.persist_state(&state).await?;
      return Ok(report);
    }

    let (written, write_errors) =
      self.artifact_store.write(&render.artifacts).await;
    report.artifacts_written = written.len();
    for (path, source) in write_errors {
      report.failures.push(format!(
        "artifact-io-error: {}: {source}",
        path.display()
      ));
    }

    if cancellation.is_cancelled() {
      return Err(CoreError::Cancelled);
    }

    if !written.is_empty() {
      if let Err(source) = self.lifecycle.reload().await {
        report.failures.push(format!("lifecycle-error: reload: {source}"));
      }
    }

    if cancellation.is_cancelled() {
      return Err(CoreError::Cancelled);
    }

    let mut infra_names = Vec::new();
    let mut container_names = Vec::new();
    for (name, change) in &render.service_changes {
      if !change.changed {
        continue;
      }
      if change.is_infrastructure {
        infra_names.push(name.clone());
      } else {
        container_names.push(name.clone());
      }
    }
    infra_names.sort();
    container_names.sort();

    if !infra_names.is_empty() {
      let results = self.lifecycle.restart(&infra_names).await;
      record_batch_failures(&mut report, "restart", &results);
    }

    for name in &container_names {
      let status = self.lifecycle.status(name).await;
      let single = [name.clone()];
      let results = if status.active {
        report.services_restarted.push(name.clone());
        self.lifecycle.restart(&single).await
      } else {
        report.services_started.push(name.clone());
        self.lifecycle.start(&single).await
      };
      record_batch_failures(&mut report, "start/restart", &results);
    }

    if cancellation.is_cancelled() {
      return Err(CoreError::Cancelled);
    }

    if !obsolete.is_empty() {
      let delete_errors = self.artifact_store.delete(&obsolete).await;
      for (path, source) in delete_errors {
        report.failures.push(format!(
          "artifact-io-error: delete {}: {source}",
          path.display()
        ));
      }
      let obsolete_services: Vec<String> = obsolete
        .iter()
        .map(|p| self.renderer.unit_name_for_artifact(p))
        .collect();
      if !obsolete_services.is_empty() {
        let results = self.lifecycle.stop(&obsolete_services).await;
        report.services_stopped.extend(obsolete_services);
        record_batch_failures(&mut report, "stop", &results);
      }
    }

    self.persist_state(&state).await?;

    Ok(report)
  }

  async fn persist_state(
    &self,
    state: &HashMap<String, RepoDeploymentState>,
  ) -> Result<(), CoreError> {
    self.state_store.save(state).await.map_err(|source| {
      CoreError::ArtifactIoError { path: "deployment-state.json".into(), source }
    })
  }
}

fn select_repositories(
  repositories: &[RepositoryDescriptor],
  options: &SyncOptions,
) -> Result<Vec<RepositoryDescriptor>, CoreError> {
  match &options.repo_filter {
    None => Ok(repositories.to_vec()),
    Some(name) => {
      let found = repositories.iter().find(|r| &r.name == name).cloned();
      found.map(|r| vec![r]).ok_or_else(|| CoreError::ConfigInvalid {
        message: format!("unknown repository '{name}'"),
      })
    }
  }
}

fn artifact_belongs_to_processed_project(
  path: &Path,
  processed: &HashSet<String>,
) -> bool {
  let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
    return false;
  };
  processed.iter().any(|project| {
    stem == project.as_str()
      || stem.starts_with(&format!("{project}_"))
      || stem.contains(&format!(".{project}_"))
  })
}

fn record_batch_failures(
  report: &mut SyncReport,
  operation: &str,
  results: &HashMap<String, anyhow::Result<()>>,
) {
  for (name, result) in results {
    if let Err(source) = result {
      report.failures.push(format!(
        "lifecycle-error: {operation} '{name}': {source}"
      ));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{QuadletLifecycle, QuadletRenderer};
  use crate::types::{ComposeProject, ComposeService};
  use quadsync_command::FakeCommandRunner;

  struct StaticLoader(Vec<ComposeProject>);

  impl ComposeLoader for StaticLoader {
    fn load(&self, _compose_dir: &Path) -> anyhow::Result<Vec<ComposeProject>> {
      Ok(self.0.clone())
    }
  }

  fn descriptor() -> RepositoryDescriptor {
    RepositoryDescriptor {
      name: "blog".into(),
      url: "https://example.com/blog.git".into(),
      reference: "main".into(),
      compose_subdir: String::new(),
    }
  }

  fn project() -> ComposeProject {
    ComposeProject {
      name: "blog".into(),
      services: vec![ComposeService {
        name: "web".into(),
        image: Some("nginx:latest".into()),
        ..Default::default()
      }],
    }
  }

  #[tokio::test]
  async fn first_sync_clones_renders_and_starts() {
    let dir = tempfile::tempdir().unwrap();
    let repo_root = dir.path().join("repos");
    let artifact_root = dir.path().join("artifacts");
    let state_dir = dir.path().join("state");

    let runner = FakeCommandRunner::new();
    runner.script(
      "rev-parse",
      quadsync_command::CommandOutput::ok("git rev-parse HEAD", "abc123\n"),
    );

    let loader = StaticLoader(vec![project()]);
    let renderer = QuadletRenderer;
    let lifecycle = QuadletLifecycle::new(&runner);
    let store = ArtifactStore::new(
      artifact_root.clone(),
      renderer.managed_extensions(),
      None,
    );
    let state_store = DeploymentStateStore::new(&state_dir);

    let engine = SyncEngine {
      repo_root: repo_root.clone(),
      command_runner: &runner,
      compose_loader: &loader,
      renderer: &renderer,
      lifecycle: &lifecycle,
      artifact_store: &store,
      state_store: &state_store,
    };

    let report = engine
      .reconcile(&[descriptor()], &SyncOptions::default(), &CancellationToken::new())
      .await
      .unwrap();

    assert!(report.success());
    assert_eq!(report.artifacts_written, 1);
    assert_eq!(report.services_started, vec!["blog_web".to_string()]);
    assert!(artifact_root.join("blog_web.container").exists());
    assert_eq!(runner.call_count_containing("daemon-reload"), 1);
  }

  #[tokio::test]
  async fn unchanged_repeat_sync_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let repo_root = dir.path().join("repos");
    let artifact_root = dir.path().join("artifacts");
    let state_dir = dir.path().join("state");

    let runner = FakeCommandRunner::new();
    runner.script(
      "rev-parse",
      quadsync_command::CommandOutput::ok("git rev-parse HEAD", "abc123\n"),
    );

    let loader = StaticLoader(vec![project()]);
    let renderer = QuadletRenderer;
    let lifecycle = QuadletLifecycle::new(&runner);
    let store = ArtifactStore::new(
      artifact_root.clone(),
      renderer.managed_extensions(),
      None,
    );
    let state_store = DeploymentStateStore::new(&state_dir);

    let engine = SyncEngine {
      repo_root: repo_root.clone(),
      command_runner: &runner,
      compose_loader: &loader,
      renderer: &renderer,
      lifecycle: &lifecycle,
      artifact_store: &store,
      state_store: &state_store,
    };

    engine
      .reconcile(&[descriptor()], &SyncOptions::default(), &CancellationToken::new())
      .await
      .unwrap();

    let second = engine
      .reconcile(&[descriptor()], &SyncOptions::default(), &CancellationToken::new())
      .await
      .unwrap();

    assert!(second.success());
    assert_eq!(second.artifacts_written, 0);
    assert!(second.services_started.is_empty());
    assert!(second.services_restarted.is_empty());
    assert_eq!(runner.call_count_containing("daemon-reload"), 1);
  }

  #[tokio::test]
  async fn unknown_repo_filter_is_config_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeCommandRunner::new();
    let loader = StaticLoader(vec![]);
    let renderer = QuadletRenderer;
    let lifecycle = QuadletLifecycle::new(&runner);
    let store = ArtifactStore::new(
      dir.path().join("artifacts"),
      renderer.managed_extensions(),
      None,
    );
    let state_store = DeploymentStateStore::new(&dir.path().join("state"));

    let engine = SyncEngine {
      repo_root: dir.path().join("repos"),
      command_runner: &runner,
      compose_loader: &loader,
      renderer: &renderer,
      lifecycle: &lifecycle,
      artifact_store: &store,
      state_store: &state_store,
    };

    let options =
      SyncOptions { repo_filter: Some("ghost".into()), ..Default::default() };
    let result =
      engine.reconcile(&[descriptor()], &options, &CancellationToken::new()).await;
    assert!(matches!(result, Err(CoreError::ConfigInvalid { .. })));
  }
}
