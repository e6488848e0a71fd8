//! Platform-neutral data model shared by the compose processor,
//! renderer, artifact store, and lifecycle controller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An already-parsed Compose project. The CLI adapter is responsible
/// for producing this from YAML; nothing under this crate ever reads
/// a compose file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeProject {
  pub name: String,
  pub services: Vec<ComposeService>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposeService {
  pub name: String,
  pub image: Option<String>,
  pub build: Option<ComposeBuild>,
  #[serde(default)]
  pub command: Vec<String>,
  #[serde(default)]
  pub entrypoint: Vec<String>,
  #[serde(default)]
  pub environment: HashMap<String, String>,
  #[serde(default)]
  pub labels: HashMap<String, String>,
  pub restart: Option<String>,
  pub user: Option<String>,
  #[serde(default)]
  pub group_add: Vec<String>,
  /// Entries are either a sibling service name, or `other-project.service`
  /// for a cross-project reference.
  #[serde(default)]
  pub depends_on: Vec<String>,
  #[serde(default)]
  pub networks: Vec<ComposeResourceRef>,
  #[serde(default)]
  pub volumes: Vec<ComposeResourceRef>,
  pub deploy_resources: Option<DeployResources>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeBuild {
  pub context: String,
  #[serde(default)]
  pub args: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeResourceRef {
  pub name: String,
  #[serde(default)]
  pub external: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployResources {
  pub cpus: Option<String>,
  pub memory: Option<String>,
}

/// Platform-neutral intermediate representation of one container to
/// be supervised; the output of the Compose Processor and the input
/// to the Platform Renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
  /// `{project}_{service}`; unique across the deployment.
  pub name: String,
  pub project: String,
  pub container: ContainerSpec,
  pub volumes: Vec<ResourceRef>,
  pub networks: Vec<ResourceRef>,
  /// Sibling spec names within the same batch.
  pub depends_on: Vec<String>,
  pub external_dependencies: Vec<ExternalDependency>,
  pub build: Option<BuildSpec>,
  /// True for specs synthesized from `init-containers`; these are
  /// ordered before the service that declared them and never
  /// restarted independently.
  pub is_init_container: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
  pub image: Option<String>,
  #[serde(default)]
  pub command: Vec<String>,
  #[serde(default)]
  pub entrypoint: Vec<String>,
  #[serde(default)]
  pub env: HashMap<String, String>,
  #[serde(default)]
  pub labels: HashMap<String, String>,
  pub restart_policy: Option<String>,
  pub user: Option<String>,
  #[serde(default)]
  pub group_add: Vec<String>,
  pub cpus: Option<String>,
  pub memory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
  pub name: String,
  pub external: bool,
}

/// A cross-project `depends_on` reference. `exists_in_runtime` is
/// blank until the Dependency Validator fills it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDependency {
  pub project: String,
  pub service: String,
  pub optional: bool,
  pub exists_in_runtime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
  pub context: String,
  pub args: HashMap<String, String>,
}

/// One on-disk file a supervisor back-end consumes. Hash covers
/// `content` only, never path or mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
  pub path: std::path::PathBuf,
  pub content: Vec<u8>,
  pub mode: u32,
  pub hash: String,
}

impl Artifact {
  pub fn new(path: std::path::PathBuf, content: Vec<u8>, mode: u32) -> Self {
    let hash = content_hash(&content);
    Artifact { path, content, mode, hash }
  }
}

pub fn content_hash(content: &[u8]) -> String {
  use sha2::{Digest, Sha256};
  let mut hasher = Sha256::new();
  hasher.update(content);
  hex::encode(hasher.finalize())
}

/// Output of the Platform Renderer: every artifact for the batch,
/// plus a per-service summary of which artifact paths it owns and
/// whether any of them changed relative to what's on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderResult {
  pub artifacts: Vec<Artifact>,
  pub service_changes: HashMap<String, ServiceChange>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceChange {
  pub changed: bool,
  pub artifact_paths: Vec<std::path::PathBuf>,
  /// True for networks/volumes/builds: restarted rather than
  /// start/restart-on-active like a container.
  pub is_infrastructure: bool,
}

/// Status of one supervised unit, as reported by the Lifecycle
/// Controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
  pub name: String,
  pub active: bool,
  pub state: String,
  pub substate: String,
  pub description: String,
  pub pid: Option<u32>,
  pub since: Option<String>,
  pub error: Option<String>,
}

/// Persisted per-repository `{current, previous}` commit, used to
/// answer "has this repo changed" and to support `--rollback`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoDeploymentState {
  pub current_commit: Option<String>,
  pub previous_commit: Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn artifact_hash_depends_only_on_content() {
    let a = Artifact::new("a.container".into(), b"same".to_vec(), 0o644);
    let b = Artifact::new("b.container".into(), b"same".to_vec(), 0o600);
    assert_eq!(a.hash, b.hash);
  }

  #[test]
  fn artifact_hash_changes_with_content() {
    let a = Artifact::new("a.container".into(), b"one".to_vec(), 0o644);
    let b = Artifact::new("a.container".into(), b"two".to_vec(), 0o644);
    assert_ne!(a.hash, b.hash);
  }
}
