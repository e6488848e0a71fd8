//! Deserializes a pragmatic subset of the Compose file schema directly
//! into `quadsync_core::types::ComposeProject`. The core never reads
//! YAML itself; this is the one place that boundary is crossed.
//!
//! One `*.yml`/`*.yaml` file directly under the compose directory is
//! one project, named after its file stem. This is documented as a
//! deliberate simplification rather than full Compose-spec fidelity
//! (no `include`, no multi-file merge, no profiles).

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use quadsync_core::compose::ComposeLoader;
use quadsync_core::types::{
  ComposeBuild, ComposeProject, ComposeResourceRef, ComposeService,
  DeployResources,
};
use serde::Deserialize;

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlComposeLoader;

impl ComposeLoader for YamlComposeLoader {
  fn load(&self, compose_dir: &Path) -> anyhow::Result<Vec<ComposeProject>> {
    let mut projects = Vec::new();

    let entries = std::fs::read_dir(compose_dir).with_context(|| {
      format!("failed to read compose directory '{}'", compose_dir.display())
    })?;

    let mut paths: Vec<_> = entries
      .filter_map(|e| e.ok())
      .map(|e| e.path())
      .filter(|p| {
        matches!(
          p.extension().and_then(|e| e.to_str()),
          Some("yml") | Some("yaml")
        )
      })
      .collect();
    paths.sort();

    for path in paths {
      let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("project")
        .to_string();
      let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
      let doc: RawComposeFile = serde_yaml_ng::from_str(&raw)
        .with_context(|| format!("failed to parse '{}'", path.display()))?;
      projects.push(doc.into_project(name));
    }

    Ok(projects)
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawComposeFile {
  #[serde(default)]
  services: HashMap<String, RawService>,
}

impl RawComposeFile {
  fn into_project(self, name: String) -> ComposeProject {
    let mut services: Vec<ComposeService> = self
      .services
      .into_iter()
      .map(|(name, raw)| raw.into_service(name))
      .collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));
    ComposeProject { name, services }
  }
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
  image: Option<String>,
  build: Option<RawBuild>,
  #[serde(default)]
  command: StringOrList,
  #[serde(default)]
  entrypoint: StringOrList,
  #[serde(default)]
  environment: HashMap<String, String>,
  #[serde(default)]
  labels: HashMap<String, String>,
  restart: Option<String>,
  user: Option<String>,
  #[serde(default)]
  group_add: Vec<String>,
  #[serde(default)]
  depends_on: StringOrList,
  #[serde(default)]
  networks: Vec<RawResourceRef>,
  #[serde(default)]
  volumes: Vec<RawResourceRef>,
  deploy: Option<RawDeploy>,
}

impl RawService {
  fn into_service(self, name: String) -> ComposeService {
    ComposeService {
      name,
      image: self.image,
      build: self.build.map(RawBuild::into_build),
      command: self.command.into_vec(),
      entrypoint: self.entrypoint.into_vec(),
      environment: self.environment,
      labels: self.labels,
      restart: self.restart,
      user: self.user,
      group_add: self.group_add,
      depends_on: self.depends_on.into_vec(),
      networks: self.networks.into_iter().map(RawResourceRef::into_ref).collect(),
      volumes: self.volumes.into_iter().map(RawResourceRef::into_ref).collect(),
      deploy_resources: self.deploy.map(|d| DeployResources {
        cpus: d.resources.as_ref().and_then(|r| r.limits.as_ref()).and_then(|l| l.cpus.clone()),
        memory: d.resources.as_ref().and_then(|r| r.limits.as_ref()).and_then(|l| l.memory.clone()),
      }),
    }
  }
}

#[derive(Debug, Deserialize)]
struct RawBuild {
  context: String,
  #[serde(default)]
  args: HashMap<String, String>,
}

impl RawBuild {
  fn into_build(self) -> ComposeBuild {
    ComposeBuild { context: self.context, args: self.args }
  }
}

#[derive(Debug, Deserialize)]
struct RawDeploy {
  resources: Option<RawDeployResources>,
}

#[derive(Debug, Deserialize)]
struct RawDeployResources {
  limits: Option<RawDeployLimits>,
}

#[derive(Debug, Deserialize)]
struct RawDeployLimits {
  cpus: Option<String>,
  memory: Option<String>,
}

/// Compose accepts either `{name}` or a bare string for network/volume
/// refs; this subset only supports the mapping form with an explicit
/// `external` flag, which is all the platform-neutral resource model
/// needs.
#[derive(Debug, Deserialize)]
struct RawResourceRef {
  name: String,
  #[serde(default)]
  external: bool,
}

impl RawResourceRef {
  fn into_ref(self) -> ComposeResourceRef {
    ComposeResourceRef { name: self.name, external: self.external }
  }
}

/// Compose's `command`/`entrypoint`/`depends_on` accept a bare string
/// or a list; this loader supports both.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
  List(Vec<String>),
  Single(String),
  Empty,
}

impl Default for StringOrList {
  fn default() -> Self {
    StringOrList::Empty
  }
}

impl StringOrList {
  fn into_vec(self) -> Vec<String> {
    match self {
      StringOrList::List(v) => v,
      StringOrList::Single(s) => s.split_whitespace().map(String::from).collect(),
      StringOrList::Empty => Vec::new(),
    }
  }
}
