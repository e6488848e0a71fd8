//! Resolves cross-project service references and external
//! network/volume references against the current batch and, failing
//! that, the running supervisor.

use std::collections::HashSet;

use quadsync_command::{CommandRunner, run_logged};

use crate::platform::{Lifecycle, Renderer};
use crate::types::ServiceSpec;

#[derive(Debug, Default)]
pub struct ValidationReport {
  pub warnings: Vec<String>,
}

/// Fills in `exists_in_runtime` on every external dependency in
/// `specs`, mutating them in place, and returns required-missing
/// resources/services as an error naming them with a remediation hint.
pub async fn validate(
  specs: &mut [ServiceSpec],
  renderer: &dyn Renderer,
  lifecycle: &dyn Lifecycle,
  command_runner: &dyn CommandRunner,
) -> anyhow::Result<ValidationReport> {
  let mut report = ValidationReport::default();
  let batch_services: HashSet<String> =
    specs.iter().map(|s| s.name.clone()).collect();

  let mut missing_required = Vec::new();

  for spec in specs.iter_mut() {
    for dep in spec.external_dependencies.iter_mut() {
      let batch_name = format!("{}_{}", dep.project, dep.service);
      if batch_services.contains(&batch_name) {
        dep.exists_in_runtime = true;
        continue;
      }
      let unit_name = renderer.service_unit_name(&dep.project, &dep.service);
      let exists = lifecycle.exists(&unit_name).await;
      dep.exists_in_runtime = exists;
      if !exists {
        if dep.optional {
          report.warnings.push(format!(
            "optional dependency '{}.{}' not found; continuing without it",
            dep.project, dep.service
          ));
        } else {
          missing_required.push(format!("{}.{}", dep.project, dep.service));
        }
      }
    }
  }

  let mut declared_networks = HashSet::new();
  let mut declared_volumes = HashSet::new();
  for spec in specs.iter() {
    for n in &spec.networks {
      if !n.external {
        declared_networks.insert(n.name.clone());
      }
    }
    for v in &spec.volumes {
      if !v.external {
        declared_volumes.insert(v.name.clone());
      }
    }
  }

  let mut missing_resources = Vec::new();
  let mut probed = HashSet::new();

  for spec in specs.iter() {
    for n in &spec.networks {
      if n.external
        && !declared_networks.contains(&n.name)
        && probed.insert(("network", n.name.clone()))
        && !inspect_exists(command_runner, "network", &n.name).await
      {
        missing_resources.push(format!("network '{}'", n.name));
      }
    }
    for v in &spec.volumes {
      if v.external
        && !declared_volumes.contains(&v.name)
        && probed.insert(("volume", v.name.clone()))
        && !inspect_exists(command_runner, "volume", &v.name).await
      {
        missing_resources.push(format!("volume '{}'", v.name));
      }
    }
  }

  if !missing_required.is_empty() || !missing_resources.is_empty() {
    let mut parts = Vec::new();
    if !missing_required.is_empty() {
      parts.push(format!(
        "missing required external dependencies: {}",
        missing_required.join(", ")
      ));
    }
    if !missing_resources.is_empty() {
      parts.push(format!(
        "missing external resources: {}",
        missing_resources.join(", ")
      ));
    }
    anyhow::bail!(
      "{} (deploy the owning project first, or pre-create the resource)",
      parts.join("; ")
    );
  }

  Ok(report)
}

async fn inspect_exists(
  runner: &dyn CommandRunner,
  kind: &str,
  name: &str,
) -> bool {
  let cmd = format!("docker {kind} inspect {name}");
  let out = run_logged(runner, "inspect external resource", None, &cmd).await;
  out.success
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::QuadletLifecycle;
  use crate::types::{ContainerSpec, ExternalDependency};
  use quadsync_command::{CommandOutput, FakeCommandRunner};

  fn spec_with_dep(optional: bool) -> ServiceSpec {
    ServiceSpec {
      name: "blog_web".into(),
      project: "blog".into(),
      container: ContainerSpec::default(),
      volumes: vec![],
      networks: vec![],
      depends_on: vec![],
      external_dependencies: vec![ExternalDependency {
        project: "auth".into(),
        service: "api".into(),
        optional,
        exists_in_runtime: false,
      }],
      build: None,
      is_init_container: false,
    }
  }

  #[tokio::test]
  async fn satisfied_by_same_batch_service() {
    let mut specs = vec![
      spec_with_dep(false),
      ServiceSpec {
        name: "auth_api".into(),
        project: "auth".into(),
        container: ContainerSpec::default(),
        volumes: vec![],
        networks: vec![],
        depends_on: vec![],
        external_dependencies: vec![],
        build: None,
        is_init_container: false,
      },
    ];
    let runner = FakeCommandRunner::new();
    let lifecycle = QuadletLifecycle::new(&runner);
    let renderer = crate::platform::QuadletRenderer;
    let report =
      validate(&mut specs, &renderer, &lifecycle, &runner).await.unwrap();
    assert!(report.warnings.is_empty());
    assert!(specs[0].external_dependencies[0].exists_in_runtime);
  }

  #[tokio::test]
  async fn missing_required_dependency_is_fatal() {
    let mut specs = vec![spec_with_dep(false)];
    let runner = FakeCommandRunner::new();
    runner.script("list-unit-files", CommandOutput::err("systemctl", "no units"));
    let lifecycle = QuadletLifecycle::new(&runner);
    let renderer = crate::platform::QuadletRenderer;
    let result = validate(&mut specs, &renderer, &lifecycle, &runner).await;
    assert!(result.is_err());
  }

  #[tokio::test]
  async fn missing_optional_dependency_is_a_warning() {
    let mut specs = vec![spec_with_dep(true)];
    let runner = FakeCommandRunner::new();
    runner.script("list-unit-files", CommandOutput::err("systemctl", "no units"));
    let lifecycle = QuadletLifecycle::new(&runner);
    let renderer = crate::platform::QuadletRenderer;
    let report =
      validate(&mut specs, &renderer, &lifecycle, &runner).await.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(!specs[0].external_dependencies[0].exists_in_runtime);
  }
}
