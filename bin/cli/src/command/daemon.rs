use quadsync_config::Config;
use quadsync_core::api::{self, Deps};
use quadsync_core::clock::SystemClock;
use quadsync_core::daemon::DaemonOptions;
use quadsync_core::platform::{
  LaunchdLifecycle, LaunchdRenderer, Platform, QuadletLifecycle, QuadletRenderer,
};
use quadsync_command::SystemCommandRunner;
use tokio_util::sync::CancellationToken;

use crate::compose_loader::YamlComposeLoader;

use super::{artifact_root, launchd_label_prefix, repo_root, repositories, resolve_platform, state_dir};

pub struct Args {
  pub repo: Option<String>,
  pub force: bool,
  pub sync_interval_secs: Option<u64>,
}

pub async fn handle(
  config: &Config,
  args: Args,
  cancellation: CancellationToken,
) -> anyhow::Result<bool> {
  let platform = resolve_platform(config)?;
  let runner = SystemCommandRunner;
  let clock = SystemClock;
  let loader = YamlComposeLoader;
  let repos = repositories(config);

  let sync_interval_secs =
    args.sync_interval_secs.unwrap_or(config.daemon.sync_interval_secs);
  let daemon_options = DaemonOptions {
    sync_interval: std::time::Duration::from_secs(sync_interval_secs),
    max_backoff: std::time::Duration::from_secs(config.daemon.max_backoff_secs),
    watchdog_interval: std::time::Duration::from_secs(
      config.daemon.watchdog_interval_secs,
    ),
    repo_filter: args.repo,
    force: args.force,
  };

  match platform {
    Platform::SystemdQuadlet => {
      let renderer = QuadletRenderer;
      let lifecycle = QuadletLifecycle::new(&runner);
      let deps = Deps {
        command_runner: &runner,
        compose_loader: &loader,
        renderer: &renderer,
        lifecycle: &lifecycle,
        clock: &clock,
      };
      run(config, platform, &repos, daemon_options, cancellation, &deps).await
    }
    Platform::LaunchdPlist => {
      let renderer = LaunchdRenderer::new(launchd_label_prefix(config));
      let lifecycle = LaunchdLifecycle::new(&runner, artifact_root(config, platform));
      let deps = Deps {
        command_runner: &runner,
        compose_loader: &loader,
        renderer: &renderer,
        lifecycle: &lifecycle,
        clock: &clock,
      };
      run(config, platform, &repos, daemon_options, cancellation, &deps).await
    }
  }
}

async fn run(
  config: &Config,
  platform: Platform,
  repos: &[quadsync_git::RepositoryDescriptor],
  daemon_options: DaemonOptions,
  cancellation: CancellationToken,
  deps: &Deps<'_>,
) -> anyhow::Result<bool> {
  match api::run_daemon(
    &repo_root(config),
    &artifact_root(config, platform),
    &state_dir(config),
    repos,
    daemon_options,
    cancellation,
    deps,
  )
  .await
  {
    Ok(()) => Ok(true),
    Err(quadsync_core::CoreError::Cancelled) => Ok(true),
    Err(error) => Err(error.into()),
  }
}
