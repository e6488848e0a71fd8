use comfy_table::{Attribute, Cell, Table};
use quadsync_config::Config;
use quadsync_core::artifact_store::ArtifactStore;
use quadsync_core::platform::{
  Lifecycle, LaunchdLifecycle, LaunchdRenderer, Platform, QuadletLifecycle,
  QuadletRenderer, Renderer,
};
use quadsync_command::SystemCommandRunner;

use super::{artifact_root, launchd_label_prefix, resolve_platform};

pub struct Args {
  pub status: bool,
}

pub async fn handle(config: &Config, args: Args) -> anyhow::Result<bool> {
  let platform = resolve_platform(config)?;
  let runner = SystemCommandRunner;

  let (managed_extensions, label_prefix): (&'static [&'static str], Option<String>) =
    match platform {
      Platform::SystemdQuadlet => (QuadletRenderer.managed_extensions(), None),
      Platform::LaunchdPlist => {
        let prefix = launchd_label_prefix(config);
        (LaunchdRenderer::new(prefix.clone()).managed_extensions(), Some(prefix))
      }
    };

  let store =
    ArtifactStore::new(artifact_root(config, platform), managed_extensions, label_prefix);
  let artifacts = store.list().await?;

  let mut rows: Vec<_> = artifacts.into_values().collect();
  rows.sort_by(|a, b| a.path.cmp(&b.path));

  let mut table = Table::new();
  table.load_preset(comfy_table::presets::UTF8_HORIZONTAL_ONLY).set_header(
    if args.status { vec!["artifact", "hash", "status"] } else { vec!["artifact", "hash"] }
      .into_iter()
      .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
  );

  for artifact in &rows {
    let name = artifact
      .path
      .file_stem()
      .and_then(|s| s.to_str())
      .unwrap_or_default()
      .to_string();
    let short_hash = artifact.hash.chars().take(12).collect::<String>();
    if args.status {
      let state = match platform {
        Platform::SystemdQuadlet => {
          let lifecycle = QuadletLifecycle::new(&runner);
          lifecycle.status(&name).await.state
        }
        Platform::LaunchdPlist => {
          let lifecycle = LaunchdLifecycle::new(&runner, artifact_root(config, platform));
          lifecycle.status(&name).await.state
        }
      };
      table.add_row([artifact.path.display().to_string(), short_hash, state]);
    } else {
      table.add_row([artifact.path.display().to_string(), short_hash]);
    }
  }

  println!("{table}");
  Ok(true)
}
