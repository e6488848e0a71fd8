//! macOS launchd back-end: renders one `.plist` per service spec and
//! drives `launchctl`. There is no systemd-style infrastructure tier
//! here — networks and volumes are Docker's problem, not launchd's.

use std::collections::HashMap;

use quadsync_command::{CommandRunner, run_logged};

use crate::types::{Artifact, RenderResult, ServiceChange, ServiceSpec, ServiceStatus};

use super::Renderer;

pub struct LaunchdRenderer {
  pub label_prefix: String,
}

impl LaunchdRenderer {
  pub fn new(label_prefix: impl Into<String>) -> Self {
    LaunchdRenderer { label_prefix: label_prefix.into() }
  }

  fn label(&self, spec: &ServiceSpec) -> String {
    format!("{}.{}", self.label_prefix, spec.name)
  }
}

impl Renderer for LaunchdRenderer {
  fn render(
    &self,
    specs: &[ServiceSpec],
    existing: &HashMap<std::path::PathBuf, Artifact>,
  ) -> RenderResult {
    let mut artifacts = Vec::new();
    let mut service_changes = HashMap::new();

    for spec in specs {
      let label = self.label(spec);
      let path = std::path::PathBuf::from(format!("{label}.plist"));
      let artifact =
        Artifact::new(path.clone(), render_plist(&label, spec).into_bytes(), 0o644);
      let changed = match existing.get(&artifact.path) {
        Some(current) => current.hash != artifact.hash,
        None => true,
      };
      artifacts.push(artifact);
      service_changes.insert(
        label,
        ServiceChange {
          changed,
          artifact_paths: vec![path],
          is_infrastructure: false,
        },
      );
    }

    RenderResult { artifacts, service_changes }
  }

  /// Same `{prefix}.{project}_{service}` form as [`Self::label`], so a
  /// cross-project dependency probe resolves to the same unit the
  /// owning project's own render registered.
  fn service_unit_name(&self, project: &str, service: &str) -> String {
    format!("{}.{project}_{service}", self.label_prefix)
  }

  fn unit_name_for_artifact(&self, path: &std::path::Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string()
  }

  fn managed_extensions(&self) -> &'static [&'static str] {
    &["plist"]
  }
}

fn render_plist(label: &str, spec: &ServiceSpec) -> String {
  let mut program_args = String::new();
  if let Some(image) = &spec.container.image {
    program_args.push_str(&format!("\t\t<string>docker</string>\n\t\t<string>run</string>\n\t\t<string>--rm</string>\n\t\t<string>--name</string>\n\t\t<string>{}</string>\n\t\t<string>{image}</string>\n", spec.name));
  }

  let mut env_entries = String::new();
  let mut env: Vec<_> = spec.container.env.iter().collect();
  env.sort_by_key(|(k, _)| k.clone());
  for (key, value) in env {
    env_entries.push_str(&format!("\t\t<key>{key}</key>\n\t\t<string>{value}</string>\n"));
  }

  format!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
<plist version=\"1.0\">\n\
<dict>\n\
\t<key>Label</key>\n\
\t<string>{label}</string>\n\
\t<key>ProgramArguments</key>\n\
\t<array>\n{program_args}\t</array>\n\
\t<key>EnvironmentVariables</key>\n\
\t<dict>\n{env_entries}\t</dict>\n\
\t<key>KeepAlive</key>\n\
\t<{keep_alive}/>\n\
\t<key>RunAtLoad</key>\n\
\t<true/>\n\
</dict>\n\
</plist>\n",
    keep_alive = if spec.container.restart_policy.as_deref() == Some("no") {
      "false"
    } else {
      "true"
    },
  )
}

/// Drives `launchctl` for managed user agents.
pub struct LaunchdLifecycle<'a> {
  pub runner: &'a dyn CommandRunner,
  pub plist_dir: std::path::PathBuf,
}

impl<'a> LaunchdLifecycle<'a> {
  pub fn new(runner: &'a dyn CommandRunner, plist_dir: std::path::PathBuf) -> Self {
    LaunchdLifecycle { runner, plist_dir }
  }

  fn plist_path(&self, label: &str) -> std::path::PathBuf {
    self.plist_dir.join(format!("{label}.plist"))
  }

  async fn batch(
    &self,
    verb: &str,
    names: &[String],
  ) -> HashMap<String, anyhow::Result<()>> {
    let mut results = HashMap::new();
    for label in names {
      let cmd = match verb {
        "start" => format!(
          "launchctl bootstrap gui/$(id -u) {}",
          self.plist_path(label).display()
        ),
        "stop" => format!("launchctl bootout gui/$(id -u)/{label}"),
        "restart" => format!("launchctl kickstart -k gui/$(id -u)/{label}"),
        _ => unreachable!(),
      };
      let out = run_logged(self.runner, verb, None, &cmd).await;
      let result = if out.success {
        Ok(())
      } else {
        Err(anyhow::anyhow!("{}", out.stderr))
      };
      results.insert(label.clone(), result);
    }
    results
  }
}

impl<'a> super::Lifecycle for LaunchdLifecycle<'a> {
  fn reload<'b>(
    &'b self,
  ) -> std::pin::Pin<
    Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'b>,
  > {
    // launchd has no single daemon-reload; bootstrap/bootout per unit
    // is the reload mechanism, applied at start/restart time instead.
    Box::pin(async move { Ok(()) })
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
      let cmd = format!("launchctl print gui/$(id -u)/{name}");
      let out = run_logged(self.runner, "status", None, &cmd).await;
      let active = out.success && out.stdout.contains("state = running");
      ServiceStatus {
        name: name.to_string(),
        active,
        state: if active { "running".into() } else { "stopped".into() },
        substate: String::new(),
        description: out.stdout.clone(),
        pid: None,
        since: None,
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
      let cmd = format!("launchctl print gui/$(id -u)/{name}");
      let out = run_logged(self.runner, "exists", None, &cmd).await;
      out.success
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::ContainerSpec;
  use quadsync_command::FakeCommandRunner;

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
  fn renders_one_plist_per_spec() {
    let renderer = LaunchdRenderer::new("dev.quadsync");
    let result = renderer.render(&[spec("blog_web")], &HashMap::new());
    assert_eq!(result.artifacts.len(), 1);
    assert_eq!(
      result.artifacts[0].path,
      std::path::PathBuf::from("dev.quadsync.blog_web.plist")
    );
  }

  #[tokio::test]
  async fn reload_is_a_no_op() {
    let runner = FakeCommandRunner::new();
    let lifecycle =
      LaunchdLifecycle::new(&runner, std::path::PathBuf::from("/tmp"));
    use super::super::Lifecycle;
    lifecycle.reload().await.unwrap();
    assert_eq!(runner.calls().len(), 0);
  }

  #[tokio::test]
  async fn start_invokes_bootstrap() {
    let runner = FakeCommandRunner::new();
    let lifecycle =
      LaunchdLifecycle::new(&runner, std::path::PathBuf::from("/tmp"));
    use super::super::Lifecycle;
    let names = vec!["dev.quadsync.blog_web".to_string()];
    let results = lifecycle.start(&names).await;
    assert!(results["dev.quadsync.blog_web"].is_ok());
    assert_eq!(runner.call_count_containing("bootstrap"), 1);
  }
}
