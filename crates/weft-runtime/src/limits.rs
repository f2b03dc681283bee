//! Per-task admission control for mapped fan-out.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Bounds shared by every item of one mapped task.
#[derive(Debug, Clone, Default)]
pub(crate) struct FanOutLimits {
  permits: Option<Arc<Semaphore>>,
  pacer: Option<Arc<Pacer>>,
}

impl FanOutLimits {
  pub(crate) fn new(workers: Option<usize>, per_minute: Option<u32>) -> Self {
    Self {
      permits: workers.map(|n| Arc::new(Semaphore::new(n.max(1)))),
      pacer: per_minute
        .filter(|n| *n > 0)
        .map(|n| Arc::new(Pacer::new(Duration::from_secs(60) / n))),
    }
  }

  pub(crate) fn is_unbounded(&self) -> bool {
    self.permits.is_none() && self.pacer.is_none()
  }

  /// Wait until an item may start. The permit, if any, must be held while it runs.
  pub(crate) async fn admit(&self) -> Option<OwnedSemaphorePermit> {
    let permit = match &self.permits {
      Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
      None => None,
    };
    if let Some(pacer) = &self.pacer {
      pacer.wait_turn().await;
    }
    permit
  }
}

/// Spaces starts at least `interval` apart.
#[derive(Debug)]
struct Pacer {
  interval: Duration,
  next: Mutex<Option<Instant>>,
}

impl Pacer {
  fn new(interval: Duration) -> Self {
    Self {
      interval,
      next: Mutex::new(None),
    }
  }

  async fn wait_turn(&self) {
    let at = {
      let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
      let now = Instant::now();
      let at = next.map_or(now, |slot| slot.max(now));
      *next = Some(at + self.interval);
      at
    };
    tokio::time::sleep_until(at).await;
  }
}
