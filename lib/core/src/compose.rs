//! Turns one already-parsed Compose project into an ordered, batch-local
//! list of platform-neutral service specs.

use std::collections::{HashMap, HashSet};

use crate::types::{
  BuildSpec, ComposeProject, ComposeService, ContainerSpec,
  ExternalDependency, ResourceRef, ServiceSpec,
};

const INIT_CONTAINERS_LABEL: &str = "quad-ops.init-containers";
const MAX_ENV_VALUE_BYTES: usize = 32 * 1024;
const MAX_BUILD_ARG_BYTES: usize = 4 * 1024;

/// Produces the already-parsed project model for a repo's compose
/// directory. The core never reads a compose file itself; the CLI
/// adapter implements this over `serde_yaml_ng`, tests implement it
/// over a fixed in-memory list.
pub trait ComposeLoader: Send + Sync {
  fn load(
    &self,
    compose_dir: &std::path::Path,
  ) -> anyhow::Result<Vec<ComposeProject>>;
}

/// Converts a project into specs, applying the project prefix,
/// resolving `depends_on`, splitting external references, expanding
/// init containers, and topologically sorting the result leaves-first.
pub fn process(project: &ComposeProject) -> anyhow::Result<Vec<ServiceSpec>> {
  let mut specs = Vec::new();

  for service in &project.services {
    validate_service(project, service)?;

    for (idx, init_image) in init_container_images(service).iter().enumerate()
    {
      specs.push(build_init_spec(project, service, idx, init_image));
    }

    specs.push(build_service_spec(project, service));
  }

  toposort(specs)
}

fn validate_service(
  project: &ComposeProject,
  service: &ComposeService,
) -> anyhow::Result<()> {
  for (key, value) in &service.environment {
    if key.is_empty() || key.contains('=') {
      anyhow::bail!(
        "project '{}' service '{}': invalid environment key '{key}'",
        project.name,
        service.name
      );
    }
    if value.len() > MAX_ENV_VALUE_BYTES {
      anyhow::bail!(
        "project '{}' service '{}': environment value for '{key}' exceeds {MAX_ENV_VALUE_BYTES} bytes",
        project.name,
        service.name
      );
    }
  }

  if let Some(build) = &service.build {
    for (key, value) in &build.args {
      if value.len() > MAX_BUILD_ARG_BYTES {
        anyhow::bail!(
          "project '{}' service '{}': build arg '{key}' exceeds {MAX_BUILD_ARG_BYTES} bytes",
          project.name,
          service.name
        );
      }
    }
  }

  Ok(())
}

fn init_container_images(service: &ComposeService) -> Vec<String> {
  service
    .labels
    .get(INIT_CONTAINERS_LABEL)
    .map(|csv| {
      csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
    })
    .unwrap_or_default()
}

fn build_init_spec(
  project: &ComposeProject,
  service: &ComposeService,
  idx: usize,
  image: &str,
) -> ServiceSpec {
  let name = format!("{}_{}-init-{}", project.name, service.name, idx + 1);
  ServiceSpec {
    name,
    project: project.name.clone(),
    container: ContainerSpec {
      image: Some(image.to_string()),
      restart_policy: Some("no".into()),
      ..Default::default()
    },
    volumes: Vec::new(),
    networks: Vec::new(),
    depends_on: Vec::new(),
    external_dependencies: Vec::new(),
    build: None,
    is_init_container: true,
  }
}

fn build_service_spec(
  project: &ComposeProject,
  service: &ComposeService,
) -> ServiceSpec {
  let name = format!("{}_{}", project.name, service.name);

  let mut depends_on = Vec::new();
  let mut external_dependencies = Vec::new();
  for dep in &service.depends_on {
    match dep.split_once('.') {
      Some((other_project, other_service))
        if other_project != project.name =>
      {
        external_dependencies.push(ExternalDependency {
          project: other_project.to_string(),
          service: other_service.to_string(),
          optional: false,
          exists_in_runtime: false,
        });
      }
      _ => depends_on.push(format!("{}_{}", project.name, dep)),
    }
  }

  let volumes = service
    .volumes
    .iter()
    .map(|v| ResourceRef {
      name: if v.external {
        v.name.clone()
      } else {
        format!("{}_{}", project.name, v.name)
      },
      external: v.external,
    })
    .collect();

  let networks = service
    .networks
    .iter()
    .map(|n| ResourceRef {
      name: if n.external {
        n.name.clone()
      } else {
        format!("{}_{}", project.name, n.name)
      },
      external: n.external,
    })
    .collect();

  let build = service.build.as_ref().map(|b| BuildSpec {
    context: b.context.clone(),
    args: b.args.clone(),
  });

  let mut init_depends_on: Vec<String> = (0..init_container_images(service)
    .len())
    .map(|idx| format!("{}_{}-init-{}", project.name, service.name, idx + 1))
    .collect();
  init_depends_on.extend(depends_on);

  ServiceSpec {
    name,
    project: project.name.clone(),
    container: ContainerSpec {
      image: service.image.clone(),
      command: service.command.clone(),
      entrypoint: service.entrypoint.clone(),
      env: service.environment.clone(),
      labels: service.labels.clone(),
      restart_policy: service.restart.clone(),
      user: service.user.clone(),
      group_add: service.group_add.clone(),
      cpus: service.deploy_resources.as_ref().and_then(|d| d.cpus.clone()),
      memory: service.deploy_resources.as_ref().and_then(|d| d.memory.clone()),
    },
    volumes,
    networks,
    depends_on: init_depends_on,
    external_dependencies,
    build,
    is_init_container: false,
  }
}

/// Stable topological sort, leaves first, tie-broken by name. Errors
/// if `depends_on` forms a cycle or points outside the batch.
fn toposort(specs: Vec<ServiceSpec>) -> anyhow::Result<Vec<ServiceSpec>> {
  let by_name: HashMap<&str, &ServiceSpec> =
    specs.iter().map(|s| (s.name.as_str(), s)).collect();

  for spec in &specs {
    for dep in &spec.depends_on {
      if !by_name.contains_key(dep.as_str()) {
        anyhow::bail!(
          "service '{}' depends_on unknown sibling '{dep}'",
          spec.name
        );
      }
    }
  }

  let mut sorted = Vec::with_capacity(specs.len());
  let mut visited: HashSet<String> = HashSet::new();
  let mut visiting: HashSet<String> = HashSet::new();

  let mut order: Vec<&ServiceSpec> = specs.iter().collect();
  order.sort_by(|a, b| a.name.cmp(&b.name));

  fn visit<'a>(
    spec: &'a ServiceSpec,
    by_name: &HashMap<&str, &'a ServiceSpec>,
    visited: &mut HashSet<String>,
    visiting: &mut HashSet<String>,
    sorted: &mut Vec<&'a ServiceSpec>,
  ) -> anyhow::Result<()> {
    if visited.contains(&spec.name) {
      return Ok(());
    }
    if !visiting.insert(spec.name.clone()) {
      anyhow::bail!("dependency cycle detected at service '{}'", spec.name);
    }

    let mut deps: Vec<&str> =
      spec.depends_on.iter().map(String::as_str).collect();
    deps.sort_unstable();
    for dep in deps {
      visit(by_name[dep], by_name, visited, visiting, sorted)?;
    }

    visiting.remove(&spec.name);
    visited.insert(spec.name.clone());
    sorted.push(spec);
    Ok(())
  }

  for spec in order {
    visit(spec, &by_name, &mut visited, &mut visiting, &mut sorted)?;
  }

  Ok(sorted.into_iter().cloned().collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::ComposeResourceRef;

  fn service(name: &str) -> ComposeService {
    ComposeService {
      name: name.into(),
      image: Some("nginx:latest".into()),
      ..Default::default()
    }
  }

  #[test]
  fn applies_project_prefix_to_names() {
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![service("web")],
    };
    let specs = process(&project).unwrap();
    assert_eq!(specs[0].name, "blog_web");
  }

  #[test]
  fn resolves_sibling_depends_on() {
    let mut web = service("web");
    web.depends_on = vec!["db".into()];
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![web, service("db")],
    };
    let specs = process(&project).unwrap();
    let web_spec = specs.iter().find(|s| s.name == "blog_web").unwrap();
    assert_eq!(web_spec.depends_on, vec!["blog_db"]);
    // db sorts first: it's a leaf the web service depends on.
    assert_eq!(specs[0].name, "blog_db");
  }

  #[test]
  fn splits_cross_project_depends_on_into_external() {
    let mut web = service("web");
    web.depends_on = vec!["auth.api".into()];
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![web],
    };
    let specs = process(&project).unwrap();
    assert!(specs[0].depends_on.is_empty());
    assert_eq!(specs[0].external_dependencies.len(), 1);
    assert_eq!(specs[0].external_dependencies[0].project, "auth");
    assert_eq!(specs[0].external_dependencies[0].service, "api");
  }

  #[test]
  fn external_network_is_not_prefixed() {
    let mut web = service("web");
    web.networks = vec![ComposeResourceRef {
      name: "shared".into(),
      external: true,
    }];
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![web],
    };
    let specs = process(&project).unwrap();
    assert_eq!(specs[0].networks[0].name, "shared");
    assert!(specs[0].networks[0].external);
  }

  #[test]
  fn owned_network_gets_project_prefix() {
    let mut web = service("web");
    web.networks = vec![ComposeResourceRef {
      name: "frontend".into(),
      external: false,
    }];
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![web],
    };
    let specs = process(&project).unwrap();
    assert_eq!(specs[0].networks[0].name, "blog_frontend");
  }

  #[test]
  fn init_containers_expand_and_order_before_service() {
    let mut web = service("web");
    web.labels.insert(
      INIT_CONTAINERS_LABEL.into(),
      "migrate:latest, seed:latest".into(),
    );
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![web],
    };
    let specs = process(&project).unwrap();
    assert_eq!(specs.len(), 3);
    assert_eq!(specs[0].name, "blog_web-init-1");
    assert_eq!(specs[1].name, "blog_web-init-2");
    assert_eq!(specs[2].name, "blog_web");
    assert!(specs[2].depends_on.contains(&"blog_web-init-1".to_string()));
    assert!(specs[2].depends_on.contains(&"blog_web-init-2".to_string()));
  }

  #[test]
  fn unknown_dependency_target_errors() {
    let mut web = service("web");
    web.depends_on = vec!["ghost".into()];
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![web],
    };
    assert!(process(&project).is_err());
  }

  #[test]
  fn oversized_env_value_is_rejected() {
    let mut web = service("web");
    web.environment.insert("BLOB".into(), "x".repeat(MAX_ENV_VALUE_BYTES + 1));
    let project = ComposeProject {
      name: "blog".into(),
      services: vec![web],
    };
    assert!(process(&project).is_err());
  }
}
