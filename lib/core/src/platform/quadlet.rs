//! systemd "quadlet" back-end: renders `.container`/`.network`/
//! `.volume`/`.build` unit files and drives `systemctl --user`.

use std::collections::{HashMap, HashSet};

use quadsync_command::{CommandRunner, run_logged};

use crate::types::{Artifact, RenderResult, ServiceChange, ServiceSpec, ServiceStatus};

use super::Renderer;

#[derive(Debug, Default, Clone, Copy)]
pub struct QuadletRenderer;

impl Renderer for QuadletRenderer {
  fn render(
    &self,
    specs: &[ServiceSpec],
    existing: &HashMap<std::path::PathBuf, Artifact>,
  ) -> RenderResult {
    let mut artifacts = Vec::new();
    let mut service_changes = HashMap::new();
    let mut emitted_networks = HashSet::new();
    let mut emitted_volumes = HashSet::new();

    for spec in specs {
      let container_path =
        std::path::PathBuf::from(format!("{}.container", spec.name));
      let artifact = Artifact::new(
        container_path.clone(),
        render_container_unit(spec).into_bytes(),
        0o644,
      );
      let changed = is_changed(&artifact, existing);
      let unit = self.unit_name_for_artifact(&container_path);
      artifacts.push(artifact);
      service_changes.insert(
        unit,
        ServiceChange {
          changed,
          artifact_paths: vec![container_path],
          is_infrastructure: false,
        },
      );

      if let Some(build) = &spec.build {
        let build_path =
          std::path::PathBuf::from(format!("{}.build", spec.name));
        let artifact = Artifact::new(
          build_path.clone(),
          render_build_unit(&spec.name, build).into_bytes(),
          0o644,
        );
        let changed = is_changed(&artifact, existing);
        let unit = self.unit_name_for_artifact(&build_path);
        artifacts.push(artifact);
        service_changes.insert(
          unit,
          ServiceChange {
            changed,
            artifact_paths: vec![build_path],
            is_infrastructure: true,
          },
        );
      }

      for network in &spec.networks {
        if network.external || !emitted_networks.insert(network.name.clone())
        {
          continue;
        }
        let path =
          std::path::PathBuf::from(format!("{}.network", network.name));
        let artifact =
          Artifact::new(path.clone(), render_network_unit().into_bytes(), 0o644);
        let changed = is_changed(&artifact, existing);
        let unit = self.unit_name_for_artifact(&path);
        artifacts.push(artifact);
        service_changes.insert(
          unit,
          ServiceChange {
            changed,
            artifact_paths: vec![path],
            is_infrastructure: true,
          },
        );
      }

      for volume in &spec.volumes {
        if volume.external || !emitted_volumes.insert(volume.name.clone()) {
          continue;
        }
        let path =
          std::path::PathBuf::from(format!("{}.volume", volume.name));
        let artifact =
          Artifact::new(path.clone(), render_volume_unit().into_bytes(), 0o644);
        let changed = is_changed(&artifact, existing);
        let unit = self.unit_name_for_artifact(&path);
        artifacts.push(artifact);
        service_changes.insert(
          unit,
          ServiceChange {
            changed,
            artifact_paths: vec![path],
            is_infrastructure: true,
          },
        );
      }
    }

    RenderResult { artifacts, service_changes }
  }

  fn service_unit_name(&self, project: &str, service: &str) -> String {
    format!("{project}_{service}.service")
  }

  /// Podman's quadlet generator maps `name.container` to `name.service`
  /// directly, but `name.network`/`name.volume`/`name.build` get a
  /// dashed suffix appended instead of the extension stripped.
  fn unit_name_for_artifact(&self, path: &std::path::Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    match path.extension().and_then(|e| e.to_str()) {
      Some("network") => format!("{stem}-network"),
      Some("volume") => format!("{stem}-volume"),
      Some("build") => format!("{stem}-build"),
      _ => stem.to_string(),
    }
  }

  fn managed_extensions(&self) -> &'static [&'static str] {
    &["container", "network", "volume", "build"]
  }
}

/// Pulls a `Key=value` line out of `systemctl show` output.
fn show_field(stdout: &str, key: &str) -> Option<String> {
  let prefix = format!("{key}=");
  stdout.lines().find_map(|line| {
    line.strip_prefix(&prefix).map(str::to_string).filter(|v| !v.is_empty())
  })
}

/// systemd renders `ActiveEnterTimestamp` as e.g.
/// `Wed 2024-01-01 00:00:00 UTC`. Reformats it to RFC 3339 for callers
/// that want a sortable, unambiguous string; falls back to the raw
/// value if the format ever drifts rather than dropping it.
fn parse_systemctl_timestamp(raw: &str) -> Option<String> {
  let fields: Vec<&str> = raw.split_whitespace().collect();
  let (date, time) = match fields.as_slice() {
    [_weekday, date, time, ..] => (*date, *time),
    [date, time] => (*date, *time),
    _ => return None,
  };
  let naive = chrono::NaiveDateTime::parse_from_str(
    &format!("{date} {time}"),
    "%Y-%m-%d %H:%M:%S",
  )
  .ok()?;
  Some(naive.and_utc().to_rfc3339())
}

fn is_changed(
  artifact: &Artifact,
  existing: &HashMap<std::path::PathBuf, Artifact>,
) -> bool {
  match existing.get(&artifact.path) {
    Some(current) => current.hash != artifact.hash,
    None => true,
  }
}

fn render_container_unit(spec: &ServiceSpec) -> String {
  let mut out = String::from("[Container]\n");
  if let Some(image) = &spec.container.image {
    out.push_str(&format!("Image={image}\n"));
  }
  for arg in &spec.container.entrypoint {
    out.push_str(&format!("Entrypoint={arg}\n"));
  }
  for arg in &spec.container.command {
    out.push_str(&format!("Exec={arg}\n"));
  }
  let mut env: Vec<_> = spec.container.env.iter().collect();
  env.sort_by_key(|(k, _)| k.clone());
  for (key, value) in env {
    out.push_str(&format!("Environment={key}={value}\n"));
  }
  let mut labels: Vec<_> = spec.container.labels.iter().collect();
  labels.sort_by_key(|(k, _)| k.clone());
  for (key, value) in labels {
    out.push_str(&format!("Label={key}={value}\n"));
  }
  if let Some(user) = &spec.container.user {
    out.push_str(&format!("User={user}\n"));
  }
  for group in &spec.container.group_add {
    out.push_str(&format!("GroupAdd={group}\n"));
  }
  for network in &spec.networks {
    out.push_str(&format!("Network={}.network\n", network.name));
  }
  for volume in &spec.volumes {
    out.push_str(&format!("Volume={}.volume:/data\n", volume.name));
  }
  if spec.build.is_some() {
    out.push_str(&format!("Image={}.build\n", spec.name));
  }
  out.push_str("\n[Service]\n");
  out.push_str(&format!(
    "Restart={}\n",
    spec.container.restart_policy.as_deref().unwrap_or("on-failure")
  ));
  out.push_str("\n[Install]\nWantedBy=default.target\n");
  out
}

fn render_build_unit(
  name: &str,
  build: &crate::types::BuildSpec,
) -> String {
  let mut out = format!("[Build]\nImageTag={name}.build\nSetWorkingDirectory=yes\nContext={}\n", build.context);
  let mut args: Vec<_> = build.args.iter().collect();
  args.sort_by_key(|(k, _)| k.clone());
  for (key, value) in args {
    out.push_str(&format!("BuildArg={key}={value}\n"));
  }
  out
}

fn render_network_unit() -> String {
  "[Network]\n".to_string()
}

fn render_volume_unit() -> String {
  "[Volume]\n".to_string()
}

/// Drives `systemctl --user` for the managed units.
#[derive(Clone)]
pub struct QuadletLifecycle<'a> {
  pub runner: &'a dyn CommandRunner,
}

impl<'a> QuadletLifecycle<'a> {
  pub fn new(runner: &'a dyn CommandRunner) -> Self {
    QuadletLifecycle { runner }
  }

  async fn batch(
    &self,
    verb: &str,
    names: &[String],
  ) -> HashMap<String, anyhow::Result<()>> {
    let mut results = HashMap::new();
    for name in names {
      let cmd = format!("systemctl --user {verb} {name}");
      let out = run_logged(self.runner, verb, None, &cmd).await;
      let result = if out.success {
        Ok(())
      } else {
        Err(anyhow::anyhow!("{}", out.stderr))
      };
      results.insert(name.clone(), result);
    }
    results
  }
}

impl<'a> super::Lifecycle for QuadletLifecycle<'a> {
  fn reload<'b>(
    &'b self,
  ) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'b>,
  > {
    Box::pin(async move {
      let out = run_logged(
        self.runner,
        "reload",
        None,
        "systemctl --user daemon-reload",
      )
      .await;
      if out.success {
        Ok(())
      } else {
        anyhow::bail!("{}", out.stderr)
      }
    })
  }

  fn start<'b>(
    &'b self,
    names: &'b [String],
  ) -> std::pin::Pin<
    Box<
      dyn std::future::Future<Output = HashMap<String, anyhow::Result<()>>>
        + Send
        + 'b,
    >,
  > {
    Box::pin(self.batch("start", names))
  }

  fn stop<'b>(
    &'b self,
    names: &'b [String],
  ) -> std::pin::Pin<
    Box<
      dyn std::future::Future<Output = HashMap<String, anyhow::Result<()>>>
        + Send
        + 'b,
    >,
  > {
    Box::pin(self.batch("stop", names))
  }

  fn restart<'b>(
    &'b self,
    names: &'b [String],
  ) -> std::pin::Pin<
    Box<
      dyn std::future::Future<Output = HashMap<String, anyhow::Result<()>>>
        + Send
        + 'b,
    >,
  > {
    Box::pin(self.batch("restart", names))
  }

  fn status<'b>(
    &'b self,
    name: &'b str,
  ) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = ServiceStatus> + Send + 'b>,
  > {
    Box::pin(async move {
      let cmd = format!("systemctl --user show {name} --no-page");
      let out = run_logged(self.runner, "status", None, &cmd).await;
      let active = out.stdout.contains("ActiveState=active");
      let substate = show_field(&out.stdout, "SubState").unwrap_or_default();
      let pid = show_field(&out.stdout, "MainPID").and_then(|p| p.parse().ok());
      let since = show_field(&out.stdout, "ActiveEnterTimestamp")
        .and_then(|raw| parse_systemctl_timestamp(&raw));
      ServiceStatus {
        name: name.to_string(),
        active,
        state: if active { "active".into() } else { "inactive".into() },
        substate,
        description: out.stdout.clone(),
        pid,
        since,
        error: if out.success { None } else { Some(out.stderr) },
      }
    })
  }

  fn exists<'b>(
    &'b self,
    name: &'b str,
  ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'b>>
  {
    Box::pin(async move {
      let cmd = format!("systemctl --user list-unit-files {name}");
      let out = run_logged(self.runner, "exists", None, &cmd).await;
      out.success && out.stdout.contains(name)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::{ContainerSpec, ResourceRef};
  use quadsync_command::{CommandOutput, FakeCommandRunner};

  fn spec(name: &str) -> ServiceSpec {
    ServiceSpec {
      name: name.into(),
      project: "blog".into(),
      container: ContainerSpec {
        image: Some("nginx:latest".into()),
        ..Default::default()
      },
      volumes: vec![],
      networks: vec![],
      depends_on: vec![],
      external_dependencies: vec![],
      build: None,
      is_init_container: false,
    }
  }

  #[test]
  fn unchanged_artifact_yields_changed_false() {
    let renderer = QuadletRenderer;
    let specs = vec![spec("blog_web")];
    let first = renderer.render(&specs, &HashMap::new());
    let existing: HashMap<_, _> = first
      .artifacts
      .iter()
      .map(|a| (a.path.clone(), a.clone()))
      .collect();
    let second = renderer.render(&specs, &existing);
    assert!(!second.service_changes["blog_web"].changed);
  }

  #[test]
  fn owned_network_emits_network_artifact_once() {
    let renderer = QuadletRenderer;
    let mut a = spec("blog_web");
    a.networks = vec![ResourceRef { name: "blog_net".into(), external: false }];
    let mut b = spec("blog_worker");
    b.networks = vec![ResourceRef { name: "blog_net".into(), external: false }];
    let result = renderer.render(&[a, b], &HashMap::new());
    let network_artifacts: Vec<_> = result
      .artifacts
      .iter()
      .filter(|a| a.path.extension().unwrap() == "network")
      .collect();
    assert_eq!(network_artifacts.len(), 1);
  }

  #[test]
  fn external_network_emits_no_artifact() {
    let renderer = QuadletRenderer;
    let mut a = spec("blog_web");
    a.networks = vec![ResourceRef { name: "shared".into(), external: true }];
    let result = renderer.render(&[a], &HashMap::new());
    assert!(result.artifacts.iter().all(|a| a.path.extension().unwrap() != "network"));
  }

  #[tokio::test]
  async fn lifecycle_reload_runs_daemon_reload() {
    let runner = FakeCommandRunner::new();
    let lifecycle = QuadletLifecycle::new(&runner);
    use super::super::Lifecycle;
    lifecycle.reload().await.unwrap();
    assert_eq!(runner.call_count_containing("daemon-reload"), 1);
  }

  #[tokio::test]
  async fn lifecycle_status_parses_active_enter_timestamp() {
    let runner = FakeCommandRunner::new();
    runner.script(
      "show blog_web",
      CommandOutput::ok(
        "systemctl --user show blog_web --no-page",
        "ActiveState=active\nSubState=running\nMainPID=4821\nActiveEnterTimestamp=Wed 2024-01-01 00:00:00 UTC\n",
      ),
    );
    let lifecycle = QuadletLifecycle::new(&runner);
    use super::super::Lifecycle;
    let status = lifecycle.status("blog_web").await;
    assert!(status.active);
    assert_eq!(status.substate, "running");
    assert_eq!(status.pid, Some(4821));
    assert_eq!(status.since.as_deref(), Some("2024-01-01T00:00:00+00:00"));
  }

  #[test]
  fn show_field_ignores_empty_values() {
    assert_eq!(show_field("MainPID=\nFoo=bar", "MainPID"), None);
    assert_eq!(show_field("Foo=bar", "MainPID"), None);
    assert_eq!(show_field("MainPID=4821\nFoo=bar", "MainPID"), Some("4821".into()));
  }

  #[tokio::test]
  async fn lifecycle_start_batch_reports_per_name_failure() {
    let runner = FakeCommandRunner::new();
    runner.script(
      "start blog_db",
      CommandOutput::err("systemctl --user start blog_db", "unit not found"),
    );
    let lifecycle = QuadletLifecycle::new(&runner);
    use super::super::Lifecycle;
    let names = vec!["blog_web.service".to_string(), "blog_db".to_string()];
    let results = lifecycle.start(&names).await;
    assert!(results["blog_web.service"].is_ok());
    assert!(results["blog_db"].is_err());
  }
}
