//! A single injected abstraction for running subprocesses.
//!
//! Every external process this workspace spawns -- `git`, `systemctl`,
//! `launchctl`, `docker ... inspect` -- goes through [`CommandRunner`]
//! rather than calling `tokio::process::Command` directly. That keeps
//! the sync engine, the lifecycle controller, and the dependency
//! validator testable against a recording fake instead of a real shell.

use std::{
  future::Future,
  path::{Path, PathBuf},
  pin::Pin,
  sync::{Arc, Mutex},
};

use run_command::async_run_command;

/// Output of a single command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  pub success: bool,
}

impl CommandOutput {
  pub fn ok(command: impl Into<String>, stdout: impl Into<String>) -> Self {
    CommandOutput {
      command: command.into(),
      stdout: stdout.into(),
      stderr: String::new(),
      success: true,
    }
  }

  pub fn err(command: impl Into<String>, stderr: impl Into<String>) -> Self {
    CommandOutput {
      command: command.into(),
      stdout: String::new(),
      stderr: stderr.into(),
      success: false,
    }
  }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Injected subprocess execution. Implementations must never panic on
/// a non-zero exit status -- failure is reported through `success`.
pub trait CommandRunner: Send + Sync {
  fn run<'a>(
    &'a self,
    cwd: Option<&'a Path>,
    command: &'a str,
  ) -> BoxFuture<'a, CommandOutput>;
}

/// Shells out for real via the host shell, mirroring the rest of the
/// family's habit of running plain shell strings rather than linking
/// native clients for git / systemd / docker.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
  fn run<'a>(
    &'a self,
    cwd: Option<&'a Path>,
    command: &'a str,
  ) -> BoxFuture<'a, CommandOutput> {
    Box::pin(async move {
      let full = match cwd {
        Some(path) => format!("cd {} && {command}", path.display()),
        None => command.to_string(),
      };
      tracing::debug!(command = %full, "running command");
      let output = async_run_command(&full).await;
      CommandOutput {
        success: output.success(),
        stdout: output.stdout,
        stderr: output.stderr,
        command: full,
      }
    })
  }
}

/// Runs `command` in `cwd`, logging the stage name at debug/warn
/// level. This is the entry point the rest of the workspace uses
/// instead of calling [`CommandRunner::run`] directly, so every call
/// site gets the same tracing shape.
pub async fn run_logged(
  runner: &dyn CommandRunner,
  stage: &str,
  cwd: Option<&Path>,
  command: impl AsRef<str>,
) -> CommandOutput {
  let command = command.as_ref();
  let output = runner.run(cwd, command).await;
  if output.success {
    tracing::debug!(stage, command, "command succeeded");
  } else {
    tracing::warn!(stage, command, stderr = %output.stderr, "command failed");
  }
  output
}

/// A single recorded invocation, kept by [`FakeCommandRunner`] for
/// assertions in tests.
#[derive(Debug, Clone)]
pub struct RecordedCommand {
  pub cwd: Option<PathBuf>,
  pub command: String,
}

/// Deterministic, in-memory [`CommandRunner`] for tests. Scripted
/// responses are matched against the command string by substring;
/// the first match wins. Unmatched commands succeed with empty
/// output, which is almost always what a test wants for the
/// "nothing interesting happens" path.
#[derive(Default)]
pub struct FakeCommandRunner {
  calls: Mutex<Vec<RecordedCommand>>,
  scripted: Mutex<Vec<(String, CommandOutput)>>,
}

impl FakeCommandRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Any future command whose string contains `matches` returns `output`.
  pub fn script(&self, matches: impl Into<String>, output: CommandOutput) {
    self.scripted.lock().unwrap().push((matches.into(), output));
  }

  pub fn calls(&self) -> Vec<RecordedCommand> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count_containing(&self, needle: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| c.command.contains(needle))
      .count()
  }
}

impl CommandRunner for FakeCommandRunner {
  fn run<'a>(
    &'a self,
    cwd: Option<&'a Path>,
    command: &'a str,
  ) -> BoxFuture<'a, CommandOutput> {
    Box::pin(async move {
      self.calls.lock().unwrap().push(RecordedCommand {
        cwd: cwd.map(Path::to_path_buf),
        command: command.to_string(),
      });
      let scripted = self.scripted.lock().unwrap();
      for (needle, output) in scripted.iter() {
        if command.contains(needle.as_str()) {
          let mut output = output.clone();
          if output.command.is_empty() {
            output.command = command.to_string();
          }
          return output;
        }
      }
      CommandOutput::ok(command, "")
    })
  }
}

/// Convenience alias for the common case of sharing one runner across
/// every component constructed for a reconciliation.
pub type SharedCommandRunner = Arc<dyn CommandRunner>;

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn system_runner_reports_failure() {
    let runner = SystemCommandRunner;
    let out = runner.run(None, "exit 1").await;
    assert!(!out.success);
  }

  #[tokio::test]
  async fn system_runner_reports_success() {
    let runner = SystemCommandRunner;
    let out = runner.run(None, "true").await;
    assert!(out.success);
  }

  #[tokio::test]
  async fn fake_runner_records_calls() {
    let fake = FakeCommandRunner::new();
    fake.script("git clone", CommandOutput::ok("git clone", "done"));
    let out = fake.run(None, "git clone https://example.com repo").await;
    assert!(out.success);
    assert_eq!(out.stdout, "done");
    assert_eq!(fake.call_count_containing("git clone"), 1);
  }

  #[tokio::test]
  async fn fake_runner_defaults_to_success() {
    let fake = FakeCommandRunner::new();
    let out = fake.run(None, "anything").await;
    assert!(out.success);
  }
}
