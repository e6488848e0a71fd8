use quadsync_config::Config;
use quadsync_core::api::{self, Deps};
use quadsync_core::clock::SystemClock;
use quadsync_core::platform::{
  LaunchdLifecycle, LaunchdRenderer, Platform, QuadletLifecycle, QuadletRenderer,
};
use quadsync_command::SystemCommandRunner;

use crate::compose_loader::YamlComposeLoader;

use super::{artifact_root, launchd_label_prefix, resolve_platform};

pub struct Args {
  pub services: Vec<String>,
  pub dry_run: bool,
}

pub async fn handle(config: &Config, args: Args) -> anyhow::Result<bool> {
  let platform = resolve_platform(config)?;
  let runner = SystemCommandRunner;
  let clock = SystemClock;
  let loader = YamlComposeLoader;

  let results = match platform {
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
      api::run_up(&args.services, args.dry_run, &deps).await?
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
      api::run_up(&args.services, args.dry_run, &deps).await?
    }
  };

  let mut ok = true;
  for (name, result) in results {
    match result {
      Ok(()) => println!("{} {name}", quadsync_formatting::colored("started", quadsync_formatting::Color::Green)),
      Err(error) => {
        ok = false;
        println!("{}: {name}: {error}", quadsync_formatting::colored("failed", quadsync_formatting::Color::Red));
      }
    }
  }
  Ok(ok)
}
