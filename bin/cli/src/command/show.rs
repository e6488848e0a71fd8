use quadsync_config::Config;
use quadsync_core::api::{self, Deps};
use quadsync_core::clock::SystemClock;
use quadsync_core::platform::{
  LaunchdLifecycle, LaunchdRenderer, Platform, QuadletLifecycle, QuadletRenderer,
};
use quadsync_core::types::ServiceStatus;
use quadsync_command::SystemCommandRunner;

use crate::compose_loader::YamlComposeLoader;

use super::{artifact_root, launchd_label_prefix, resolve_platform};

pub async fn status(config: &Config, name: &str) -> anyhow::Result<bool> {
  let status = lookup(config, name).await?;
  println!("{}: {}", status.name, status.state);
  Ok(status.error.is_none())
}

pub async fn show(config: &Config, name: &str) -> anyhow::Result<bool> {
  let status = lookup(config, name).await?;
  println!("name:        {}", status.name);
  println!("state:       {}", status.state);
  println!("active:      {}", status.active);
  if let Some(pid) = status.pid {
    println!("pid:         {pid}");
  }
  if let Some(since) = &status.since {
    println!("since:       {since}");
  }
  if let Some(error) = &status.error {
    println!("error:       {error}");
  }
  if !status.description.trim().is_empty() {
    println!("\n{}", status.description.trim());
  }
  Ok(status.error.is_none())
}

async fn lookup(config: &Config, name: &str) -> anyhow::Result<ServiceStatus> {
  let platform = resolve_platform(config)?;
  let runner = SystemCommandRunner;
  let clock = SystemClock;
  let loader = YamlComposeLoader;

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
      Ok(api::run_status(name, &deps).await?)
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
      Ok(api::run_status(name, &deps).await?)
    }
  }
}
