use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

mod command;
mod compose_loader;
mod config;

#[derive(Parser)]
#[command(name = "quadsync", version, about = "GitOps sync for Compose-declared services")]
struct Cli {
  #[arg(long, global = true, default_value = "/etc/quadsync/config.yaml")]
  config: PathBuf,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run one reconciliation and exit.
  Sync {
    #[arg(long)]
    repo: Option<String>,
    #[arg(long)]
    force: bool,
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    rollback: bool,
  },
  /// Reconcile once, then loop on a ticker until terminated.
  Daemon {
    #[arg(long)]
    repo: Option<String>,
    #[arg(long)]
    force: bool,
    #[arg(long)]
    sync_interval: Option<u64>,
  },
  /// Start managed services, all or named.
  Up {
    names: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    services: Vec<String>,
    #[arg(long)]
    dry_run: bool,
  },
  /// Stop managed services, all or named.
  Down {
    names: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    services: Vec<String>,
  },
  /// List artifacts under the managed directory.
  List {
    #[arg(long)]
    status: bool,
  },
  /// Print detailed status for one service.
  Show { name: String },
  /// Print the one-line status for one service.
  Status { name: String },
  /// Static check of a Compose directory or a remote repository.
  Validate {
    path: Option<PathBuf>,
    #[arg(long)]
    repo: Option<String>,
    #[arg(long = "ref")]
    reference: Option<String>,
    #[arg(long)]
    compose_dir: Option<String>,
  },
}

async fn app(cancellation: CancellationToken) -> anyhow::Result<i32> {
  let cli = Cli::parse();
  let config = config::load(&cli.config)?;
  quadsync_logger::init(&config.logging)?;

  let success = match cli.command {
    Command::Sync { repo, force, dry_run, rollback } => {
      command::sync::handle(
        &config,
        command::sync::Args { repo, force, dry_run, rollback },
        &cancellation,
      )
      .await?
    }
    Command::Daemon { repo, force, sync_interval } => {
      command::daemon::handle(
        &config,
        command::daemon::Args { repo, force, sync_interval_secs: sync_interval },
        cancellation,
      )
      .await?
    }
    Command::Up { names, services, dry_run } => {
      let services = merge_names(names, services);
      command::up::handle(&config, command::up::Args { services, dry_run }).await?
    }
    Command::Down { names, services } => {
      let services = merge_names(names, services);
      command::down::handle(&config, command::down::Args { services }).await?
    }
    Command::List { status } => {
      command::list::handle(&config, command::list::Args { status }).await?
    }
    Command::Show { name } => command::show::show(&config, &name).await?,
    Command::Status { name } => command::show::status(&config, &name).await?,
    Command::Validate { path, repo, reference, compose_dir } => {
      let target = match (path, repo, reference, compose_dir) {
        (Some(path), None, None, None) => command::validate::Target::Path(path),
        (None, Some(url), Some(reference), Some(compose_dir)) => {
          command::validate::Target::Remote { url, reference, compose_dir }
        }
        (None, None, None, None) => {
          command::validate::Target::Path(std::env::current_dir()?)
        }
        _ => anyhow::bail!(
          "validate takes either a PATH or all of --repo/--ref/--compose-dir"
        ),
      };
      command::validate::handle(&config, target).await?
    }
  };

  Ok(if success { 0 } else { 1 })
}

fn merge_names(positional: Vec<String>, flagged: Vec<String>) -> Vec<String> {
  let mut names = positional;
  names.extend(flagged);
  names
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
  let mut term_signal =
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(signal) => signal,
      Err(error) => {
        eprintln!("{}", quadsync_formatting::format_error(&error.into()));
        return std::process::ExitCode::from(2);
      }
    };

  let cancellation = CancellationToken::new();
  let mut handle = tokio::spawn(app(cancellation.clone()));

  let result = tokio::select! {
    res = &mut handle => res.map_err(anyhow::Error::from).and_then(|r| r),
    _ = term_signal.recv() => {
      // Signal the in-flight reconciliation to stop at its next
      // checkpoint rather than aborting it mid-write; the task still
      // runs to completion, it just returns `CoreError::Cancelled`.
      cancellation.cancel();
      handle.await.map_err(anyhow::Error::from).and_then(|r| r)
    }
  };

  match result {
    Ok(code) => std::process::ExitCode::from(code as u8),
    Err(error) => {
      eprintln!("{}", quadsync_formatting::format_error(&error));
      std::process::ExitCode::from(2)
    }
  }
}
