use comfy_table::{Attribute, Cell, Table};
use quadsync_config::Config;
use quadsync_core::api::{self, Deps};
use quadsync_core::clock::SystemClock;
use quadsync_core::platform::{
  LaunchdLifecycle, LaunchdRenderer, Platform, QuadletLifecycle, QuadletRenderer,
};
use quadsync_core::sync_engine::{SyncOptions, SyncReport};
use quadsync_command::SystemCommandRunner;
use tokio_util::sync::CancellationToken;

use crate::compose_loader::YamlComposeLoader;

use super::{artifact_root, launchd_label_prefix, repo_root, repositories, resolve_platform, state_dir};

pub struct Args {
  pub repo: Option<String>,
  pub force: bool,
  pub dry_run: bool,
  pub rollback: bool,
}

pub async fn handle(
  config: &Config,
  args: Args,
  cancellation: &CancellationToken,
) -> anyhow::Result<bool> {
  let platform = resolve_platform(config)?;
  let runner = SystemCommandRunner;
  let clock = SystemClock;
  let loader = YamlComposeLoader;
  let repos = repositories(config);

  let options = SyncOptions {
    repo_filter: args.repo,
    force: args.force,
    dry_run: args.dry_run,
    rollback: args.rollback,
  };

  let report = match platform {
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
      run(config, platform, &repos, &options, cancellation, &deps).await?
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
      run(config, platform, &repos, &options, cancellation, &deps).await?
    }
  };

  print_report(&report);
  Ok(report.success())
}

async fn run(
  config: &Config,
  platform: Platform,
  repos: &[quadsync_git::RepositoryDescriptor],
  options: &SyncOptions,
  cancellation: &CancellationToken,
  deps: &Deps<'_>,
) -> anyhow::Result<SyncReport> {
  let report = api::run_sync(
    &repo_root(config),
    &artifact_root(config, platform),
    &state_dir(config),
    repos,
    options,
    cancellation,
    deps,
  )
  .await?;
  Ok(report)
}

fn print_report(report: &SyncReport) {
  let mut table = Table::new();
  table.load_preset(comfy_table::presets::UTF8_HORIZONTAL_ONLY).set_header(
    ["repository", "changed", "commit", "error"]
      .into_iter()
      .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
  );
  for outcome in &report.repo_outcomes {
    table.add_row([
      outcome.repository.clone(),
      outcome.changed.to_string(),
      outcome.commit_hash.clone().unwrap_or_default(),
      outcome.error.clone().unwrap_or_default(),
    ]);
  }
  println!("{table}");

  println!(
    "artifacts written: {} | started: {} | restarted: {} | stopped: {}{}",
    report.artifacts_written,
    report.services_started.len(),
    report.services_restarted.len(),
    report.services_stopped.len(),
    if report.dry_run { " (dry run)" } else { "" },
  );

  for warning in &report.warnings {
    println!("{}: {warning}", quadsync_formatting::colored("warning", quadsync_formatting::Color::Yellow));
  }
  for failure in &report.failures {
    println!("{}: {failure}", quadsync_formatting::colored("failure", quadsync_formatting::Color::Red));
  }
}
