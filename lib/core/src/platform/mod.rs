//! Platform polymorphism. `Renderer` and `Lifecycle` are capability-set
//! traits with exactly two implementations; selection is a `Platform`
//! enum picked once at startup from the host OS, never dynamic
//! dispatch at the artifact level.

mod launchd;
mod quadlet;

pub use launchd::{LaunchdLifecycle, LaunchdRenderer};
pub use quadlet::{QuadletLifecycle, QuadletRenderer};

use std::collections::HashMap;

use crate::types::{Artifact, RenderResult, ServiceSpec, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
  SystemdQuadlet,
  LaunchdPlist,
}

impl Platform {
  /// The platform this binary was built for, or `None` when neither
  /// back-end applies (step 1 of §4.8: fatal before any work).
  pub fn host_default() -> Option<Self> {
    if cfg!(target_os = "linux") {
      Some(Platform::SystemdQuadlet)
    } else if cfg!(target_os = "macos") {
      Some(Platform::LaunchdPlist)
    } else {
      None
    }
  }
}

/// Turns a batch of service specs into content-addressed artifacts,
/// diffing each against what's already on disk at `existing`.
pub trait Renderer: Send + Sync {
  fn render(
    &self,
    specs: &[ServiceSpec],
    existing: &HashMap<std::path::PathBuf, Artifact>,
  ) -> RenderResult;

  /// Platform-specific service name used for lifecycle calls and
  /// external-dependency lookups.
  fn service_unit_name(&self, project: &str, service: &str) -> String;

  /// Maps a rendered artifact's path to the unit name the supervisor
  /// needs for start/stop/restart/status, e.g. a quadlet `.network`
  /// file becomes a `-network` suffixed systemd unit rather than the
  /// filename itself. The sync engine never builds a unit name by hand
  /// from a path; it always goes through this.
  fn unit_name_for_artifact(&self, path: &std::path::Path) -> String;

  /// File extensions this back-end manages under the artifact root.
  fn managed_extensions(&self) -> &'static [&'static str];
}

type BoxFuture<'a, T> =
  std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Drives the supervisor. Partial failure across a batch operation is
/// reported per-name, never fatal to the call.
pub trait Lifecycle: Send + Sync {
  fn reload<'a>(&'a self) -> BoxFuture<'a, anyhow::Result<()>>;
  fn start<'a>(
    &'a self,
    names: &'a [String],
  ) -> BoxFuture<'a, HashMap<String, anyhow::Result<()>>>;
  fn stop<'a>(
    &'a self,
    names: &'a [String],
  ) -> BoxFuture<'a, HashMap<String, anyhow::Result<()>>>;
  fn restart<'a>(
    &'a self,
    names: &'a [String],
  ) -> BoxFuture<'a, HashMap<String, anyhow::Result<()>>>;
  fn status<'a>(&'a self, name: &'a str) -> BoxFuture<'a, ServiceStatus>;
  fn exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, bool>;
}
