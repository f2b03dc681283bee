//! Run-owned worker pool for blocking task bodies.
//!
//! Blocking work is handed to tokio's blocking threads, but admission is
//! bounded by a semaphore that belongs to one run. Two runs never share
//! permits, and closing the semaphore is the pool's shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct WorkerPool {
  permits: Arc<Semaphore>,
  size: usize,
  shut_down: Arc<AtomicBool>,
}

impl WorkerPool {
  pub fn new(size: usize) -> Self {
    let size = size.max(1);
    debug!(size, "worker pool acquired");
    Self {
      permits: Arc::new(Semaphore::new(size)),
      size,
      shut_down: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// Workers not currently running a job.
  pub fn idle(&self) -> usize {
    self.permits.available_permits()
  }

  /// Run `job` on a worker thread and await its output without blocking the caller.
  ///
  /// Waits for a free worker first. The permit is held by the worker thread, so
  /// a job whose caller went away still counts against the pool until it returns.
  pub async fn run<F, T>(&self, task: &str, job: F) -> Result<T, RuntimeError>
  where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
  {
    let permit = Arc::clone(&self.permits)
      .acquire_owned()
      .await
      .map_err(|_| RuntimeError::PoolClosed)?;

    tokio::task::spawn_blocking(move || {
      let _permit = permit;
      job()
    })
    .await
    .map_err(|e| RuntimeError::Panicked {
      task: task.to_string(),
      message: if e.is_panic() {
        panic_message(e.into_panic().as_ref())
      } else {
        e.to_string()
      },
    })
  }

  /// Stop accepting work. Returns `true` only for the call that actually closed the pool.
  pub fn shutdown(&self) -> bool {
    if self.shut_down.swap(true, Ordering::AcqRel) {
      return false;
    }
    self.permits.close();
    debug!(size = self.size, "worker pool released");
    true
  }

  pub fn is_shut_down(&self) -> bool {
    self.shut_down.load(Ordering::Acquire)
  }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
