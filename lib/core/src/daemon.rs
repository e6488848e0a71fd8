//! Runs the sync engine on a ticker with overlap prevention,
//! exponential backoff on repeated failure, cooperative cancellation,
//! and readiness/watchdog reporting to the host init system.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quadsync_git::RepositoryDescriptor;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::sd_notify;
use crate::sync_engine::{SyncEngine, SyncOptions, SyncReport};

#[derive(Debug, Clone)]
pub struct DaemonOptions {
  pub sync_interval: Duration,
  pub max_backoff: Duration,
  pub watchdog_interval: Duration,
  pub repo_filter: Option<String>,
  pub force: bool,
}

impl Default for DaemonOptions {
  fn default() -> Self {
    DaemonOptions {
      sync_interval: Duration::from_secs(300),
      max_backoff: Duration::from_secs(1800),
      watchdog_interval: Duration::from_secs(30),
      repo_filter: None,
      force: false,
    }
  }
}

/// The atomic overlap flag is the only process-wide state in the
/// whole workspace; everything else is a constructor parameter.
#[derive(Default)]
pub struct OverlapGuard(AtomicBool);

impl OverlapGuard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `true` if the guard was free and is now held.
  pub fn try_acquire(&self) -> bool {
    self.0.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
  }

  pub fn release(&self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct DaemonLoop<'a> {
  pub engine: SyncEngine<'a>,
  pub clock: &'a dyn Clock,
  pub guard: Arc<OverlapGuard>,
  pub cancellation: CancellationToken,
  pub options: DaemonOptions,
}

impl<'a> DaemonLoop<'a> {
  /// Runs the initial reconciliation, then loops. Returns
  /// `CoreError::Cancelled` once the token fires; initial-sync
  /// failure never prevents entering the loop.
  pub async fn run(
    &self,
    repositories: &[RepositoryDescriptor],
  ) -> Result<(), CoreError> {
    sd_notify::ready();

    let mut interval = self.options.sync_interval;
    let mut consecutive_failures: u32 = 0;

    loop {
      if self.cancellation.is_cancelled() {
        return Err(CoreError::Cancelled);
      }

      let outcome = self.run_one_reconciliation(repositories).await;

      match outcome {
        Some(report) if report.success() => {
          consecutive_failures = 0;
          interval = self.options.sync_interval;
        }
        _ => {
          // interval_k = min(base * 2^(k-1), max), so the first failure
          // keeps the normal interval and backoff doubles from there.
          // A literal base*2^k reading (first failure already doubled)
          // would skip straight to 2x on one failure; this is chosen
          // instead so a single transient failure doesn't immediately
          // cost a full doubling.
          consecutive_failures = consecutive_failures.saturating_add(1);
          let multiplier = 1u64 << consecutive_failures.saturating_sub(1).min(20);
          interval = (self.options.sync_interval * multiplier as u32)
            .min(self.options.max_backoff);
        }
      }

      if self.cancellation.is_cancelled() {
        return Err(CoreError::Cancelled);
      }

      self.sleep_with_watchdog(interval).await;
    }
  }

  async fn run_one_reconciliation(
    &self,
    repositories: &[RepositoryDescriptor],
  ) -> Option<SyncReport> {
    if !self.guard.try_acquire() {
      tracing::warn!("reconciliation already in flight, skipping this tick");
      return None;
    }

    let options = SyncOptions {
      repo_filter: self.options.repo_filter.clone(),
      force: self.options.force,
      dry_run: false,
      rollback: false,
    };

    let result =
      self.engine.reconcile(repositories, &options, &self.cancellation).await;
    self.guard.release();

    match result {
      Ok(report) => {
        if !report.success() {
          tracing::warn!(failures = ?report.failures, "reconciliation completed with failures");
        }
        Some(report)
      }
      Err(error) => {
        tracing::error!(%error, "reconciliation failed fatally");
        None
      }
    }
  }

  async fn sleep_with_watchdog(&self, total: Duration) {
    let mut remaining = total;
    while remaining > Duration::ZERO {
      if self.cancellation.is_cancelled() {
        return;
      }
      let chunk = remaining.min(self.options.watchdog_interval);
      self.clock.sleep(chunk).await;
      sd_notify::watchdog();
      remaining -= chunk;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overlap_guard_rejects_second_acquire() {
    let guard = OverlapGuard::new();
    assert!(guard.try_acquire());
    assert!(!guard.try_acquire());
    guard.release();
    assert!(guard.try_acquire());
  }

  #[test]
  fn backoff_multiplier_doubles_and_clamps() {
    let base = Duration::from_secs(300);
    let max = Duration::from_secs(1800);
    let at = |n: u32| {
      let multiplier = 1u64 << n.saturating_sub(1).min(20);
      (base * multiplier as u32).min(max)
    };
    assert_eq!(at(1), Duration::from_secs(300));
    assert_eq!(at(2), Duration::from_secs(600));
    assert_eq!(at(3), Duration::from_secs(1200));
    assert_eq!(at(4), Duration::from_secs(1800));
    assert_eq!(at(10), Duration::from_secs(1800));
  }
}
