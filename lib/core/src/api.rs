//! Thin, pure entry points the CLI adapter calls after building a
//! dependency bundle. Nothing in this module touches `clap`, prints
//! to stdout, or reads a config file -- that's the adapter's job.

use std::path::{Path, PathBuf};

use quadsync_command::CommandRunner;
use quadsync_git::RepositoryDescriptor;
use tokio_util::sync::CancellationToken;

use crate::artifact_store::ArtifactStore;
use crate::clock::Clock;
use crate::compose::ComposeLoader;
use crate::daemon::{DaemonLoop, DaemonOptions, OverlapGuard};
use crate::error::CoreError;
use crate::platform::{Lifecycle, Renderer};
use crate::state::DeploymentStateStore;
use crate::sync_engine::{SyncEngine, SyncOptions, SyncReport};
use crate::types::ServiceStatus;

/// Everything a reconciliation needs that isn't a plain value.
/// Built once per CLI invocation from the resolved `Platform`.
pub struct Deps<'a> {
  pub command_runner: &'a dyn CommandRunner,
  pub compose_loader: &'a dyn ComposeLoader,
  pub renderer: &'a dyn Renderer,
  pub lifecycle: &'a dyn Lifecycle,
  pub clock: &'a dyn Clock,
}

fn build_engine<'a>(
  repo_root: &Path,
  artifact_root: &Path,
  state_store: &'a DeploymentStateStore,
  artifact_store: &'a ArtifactStore,
  deps: &Deps<'a>,
) -> SyncEngine<'a> {
  let _ = artifact_root;
  SyncEngine {
    repo_root: repo_root.to_path_buf(),
    command_runner: deps.command_runner,
    compose_loader: deps.compose_loader,
    renderer: deps.renderer,
    lifecycle: deps.lifecycle,
    artifact_store,
    state_store,
  }
}

pub async fn run_sync(
  repo_root: &Path,
  artifact_root: &Path,
  state_dir: &Path,
  repositories: &[RepositoryDescriptor],
  options: &SyncOptions,
  cancellation: &CancellationToken,
  deps: &Deps<'_>,
) -> Result<SyncReport, CoreError> {
  let state_store = DeploymentStateStore::new(state_dir);
  let artifact_store = ArtifactStore::new(
    artifact_root.to_path_buf(),
    deps.renderer.managed_extensions(),
    None,
  );
  let engine =
    build_engine(repo_root, artifact_root, &state_store, &artifact_store, deps);
  engine.reconcile(repositories, options, cancellation).await
}

pub async fn run_daemon(
  repo_root: &Path,
  artifact_root: &Path,
  state_dir: &Path,
  repositories: &[RepositoryDescriptor],
  daemon_options: DaemonOptions,
  cancellation: CancellationToken,
  deps: &Deps<'_>,
) -> Result<(), CoreError> {
  let state_store = DeploymentStateStore::new(state_dir);
  let artifact_store = ArtifactStore::new(
    artifact_root.to_path_buf(),
    deps.renderer.managed_extensions(),
    None,
  );
  let engine =
    build_engine(repo_root, artifact_root, &state_store, &artifact_store, deps);

  let daemon = DaemonLoop {
    engine,
    clock: deps.clock,
    guard: std::sync::Arc::new(OverlapGuard::new()),
    cancellation,
    options: daemon_options,
  };

  daemon.run(repositories).await
}

/// Starts managed services: all of them, or only `service_names` when
/// non-empty. Not a reconciliation -- it never touches git, compose,
/// or artifacts, only the supervisor.
pub async fn run_up(
  service_names: &[String],
  dry_run: bool,
  deps: &Deps<'_>,
) -> Result<Vec<(String, anyhow::Result<()>)>, CoreError> {
  if dry_run {
    return Ok(
      service_names.iter().map(|n| (n.clone(), Ok(()))).collect(),
    );
  }
  let results = deps.lifecycle.start(service_names).await;
  Ok(results.into_iter().collect())
}

pub async fn run_down(
  service_names: &[String],
  deps: &Deps<'_>,
) -> Result<Vec<(String, anyhow::Result<()>)>, CoreError> {
  let results = deps.lifecycle.stop(service_names).await;
  Ok(results.into_iter().collect())
}

pub async fn run_status(
  name: &str,
  deps: &Deps<'_>,
) -> Result<ServiceStatus, CoreError> {
  Ok(deps.lifecycle.status(name).await)
}

/// Static check: runs the compose processor over a project without
/// touching disk (beyond the loader already having read it) or the
/// supervisor.
pub fn run_validate(
  compose_dir: &Path,
  deps: &Deps<'_>,
) -> Result<usize, CoreError> {
  let projects = deps.compose_loader.load(compose_dir).map_err(|source| {
    CoreError::ComposeParseError {
      project: compose_dir.display().to_string(),
      source,
    }
  })?;
  let mut total = 0;
  for project in &projects {
    let specs = crate::compose::process(project).map_err(|source| {
      CoreError::ComposeParseError { project: project.name.clone(), source }
    })?;
    total += specs.len();
  }
  Ok(total)
}

pub fn artifact_root_for(
  platform: crate::platform::Platform,
  base: &Path,
) -> PathBuf {
  match platform {
    crate::platform::Platform::SystemdQuadlet => {
      base.join("containers/systemd")
    }
    crate::platform::Platform::LaunchdPlist => base.to_path_buf(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::SystemClock;
  use crate::platform::{QuadletLifecycle, QuadletRenderer};
  use crate::types::{ComposeProject, ComposeService};
  use quadsync_command::FakeCommandRunner;

  struct StaticLoader;
  impl ComposeLoader for StaticLoader {
    fn load(&self, _dir: &Path) -> anyhow::Result<Vec<ComposeProject>> {
      Ok(vec![ComposeProject {
        name: "blog".into(),
        services: vec![ComposeService {
          name: "web".into(),
          image: Some("nginx".into()),
          ..Default::default()
        }],
      }])
    }
  }

  #[test]
  fn run_validate_counts_specs() {
    let runner = FakeCommandRunner::new();
    let loader = StaticLoader;
    let renderer = QuadletRenderer;
    let lifecycle = QuadletLifecycle::new(&runner);
    let clock = SystemClock;
    let deps = Deps {
      command_runner: &runner,
      compose_loader: &loader,
      renderer: &renderer,
      lifecycle: &lifecycle,
      clock: &clock,
    };
    let count = run_validate(Path::new("/tmp/irrelevant"), &deps).unwrap();
    assert_eq!(count, 1);
  }

  #[test]
  fn artifact_root_differs_by_platform() {
    let base = Path::new("/var/lib/quadsync");
    assert_eq!(
      artifact_root_for(crate::platform::Platform::SystemdQuadlet, base),
      base.join("containers/systemd")
    );
    assert_eq!(
      artifact_root_for(crate::platform::Platform::LaunchdPlist, base),
      base.to_path_buf()
    );
  }
}
