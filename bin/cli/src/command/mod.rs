use std::path::PathBuf;

use quadsync_config::{Config, PlatformBackend};
use quadsync_core::platform::Platform;
use quadsync_git::RepositoryDescriptor;

pub mod daemon;
pub mod down;
pub mod list;
pub mod show;
pub mod sync;
pub mod up;
pub mod validate;

pub fn repositories(config: &Config) -> Vec<RepositoryDescriptor> {
  config
    .repositories
    .iter()
    .map(|r| RepositoryDescriptor {
      name: r.name.clone(),
      url: r.url.clone(),
      reference: r.reference.clone(),
      compose_subdir: r.compose_subdir.clone(),
    })
    .collect()
}

/// Honors an explicit `platform.backend` override before falling back
/// to the host OS, so tests and cross-builds can force a back-end.
pub fn resolve_platform(config: &Config) -> anyhow::Result<Platform> {
  let configured = config.platform.backend.map(|backend| match backend {
    PlatformBackend::SystemdQuadlet => Platform::SystemdQuadlet,
    PlatformBackend::LaunchdPlist => Platform::LaunchdPlist,
  });
  configured.or_else(Platform::host_default).ok_or_else(|| {
    anyhow::anyhow!(
      "no quadlet/launchd back-end for this host; set platform.backend explicitly"
    )
  })
}

pub fn artifact_root(config: &Config, platform: Platform) -> PathBuf {
  quadsync_core::api::artifact_root_for(
    platform,
    std::path::Path::new(&config.artifact_dir),
  )
}

pub fn repo_root(config: &Config) -> PathBuf {
  PathBuf::from(&config.repository_dir)
}

pub fn state_dir(config: &Config) -> PathBuf {
  PathBuf::from(&config.state_dir)
}

pub fn launchd_label_prefix(config: &Config) -> String {
  if config.platform.launchd_label_prefix.is_empty() {
    "dev.quadsync".to_string()
  } else {
    config.platform.launchd_label_prefix.clone()
  }
}
