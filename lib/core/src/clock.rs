//! Injected time source so the daemon loop's ticker and backoff are
//! deterministically testable without real sleeps.

use std::{
  future::Future,
  pin::Pin,
  sync::Mutex,
  time::{Duration, Instant},
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Clock: Send + Sync {
  fn now(&self) -> Instant;
  fn sleep<'a>(&'a self, duration: Duration) -> BoxFuture<'a, ()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> Instant {
    Instant::now()
  }

  fn sleep<'a>(&'a self, duration: Duration) -> BoxFuture<'a, ()> {
    Box::pin(tokio::time::sleep(duration))
  }
}

/// A clock whose `now()` only advances when `sleep` is awaited, and
/// whose `sleep` returns immediately. Lets daemon-loop tests run a
/// hundred simulated backoff cycles in microseconds.
#[derive(Default)]
pub struct FakeClock {
  elapsed: Mutex<Duration>,
  start: std::sync::OnceLock<Instant>,
}

impl FakeClock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn elapsed(&self) -> Duration {
    *self.elapsed.lock().unwrap()
  }
}

impl Clock for FakeClock {
  fn now(&self) -> Instant {
    let start = *self.start.get_or_init(Instant::now);
    start + self.elapsed()
  }

  fn sleep<'a>(&'a self, duration: Duration) -> BoxFuture<'a, ()> {
    *self.elapsed.lock().unwrap() += duration;
    Box::pin(async {})
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn fake_clock_advances_only_on_sleep() {
    let clock = FakeClock::new();
    let before = clock.now();
    clock.sleep(Duration::from_secs(30)).await;
    let after = clock.now();
    assert_eq!(after - before, Duration::from_secs(30));
  }

  #[tokio::test]
  async fn system_clock_sleep_actually_waits() {
    let clock = SystemClock;
    let before = clock.now();
    clock.sleep(Duration::from_millis(5)).await;
    assert!(clock.now() >= before);
  }
}
