use std::path::{Path, PathBuf};

use quadsync_config::Config;
use quadsync_core::api::{self, Deps};
use quadsync_core::clock::SystemClock;
use quadsync_core::platform::{
  LaunchdLifecycle, LaunchdRenderer, Platform, QuadletLifecycle, QuadletRenderer,
};
use quadsync_command::SystemCommandRunner;
use quadsync_git::RepositoryDescriptor;

use crate::compose_loader::YamlComposeLoader;

use super::{artifact_root, launchd_label_prefix, resolve_platform};

pub enum Target {
  Path(PathBuf),
  Remote { url: String, reference: String, compose_dir: String },
}

pub async fn handle(config: &Config, target: Target) -> anyhow::Result<bool> {
  let platform = resolve_platform(config)?;
  let runner = SystemCommandRunner;
  let clock = SystemClock;
  let loader = YamlComposeLoader;

  let compose_dir = match &target {
    Target::Path(path) => path.clone(),
    Target::Remote { url, reference, compose_dir } => {
      let work_dir = std::env::temp_dir().join("quadsync-validate");
      let descriptor = RepositoryDescriptor {
        name: "validate".into(),
        url: url.clone(),
        reference: reference.clone(),
        compose_subdir: compose_dir.clone(),
      };
      let outcome =
        quadsync_git::pull_or_clone(&descriptor, &work_dir, None, &runner).await;
      if !outcome.success {
        anyhow::bail!(
          "failed to fetch '{url}': {}",
          outcome.error.unwrap_or_default()
        );
      }
      descriptor.compose_dir(&work_dir)
    }
  };

  let count = match platform {
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
      run(&compose_dir, &deps)?
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
      run(&compose_dir, &deps)?
    }
  };

  println!("ok: {count} service specs would be rendered");
  Ok(true)
}

fn run(compose_dir: &Path, deps: &Deps<'_>) -> anyhow::Result<usize> {
  Ok(api::run_validate(compose_dir, deps)?)
}
