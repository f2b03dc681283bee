//! Uniform invocation of cooperative and blocking bodies.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{BoxError, RuntimeError};
use crate::limits::FanOutLimits;
use crate::pool::{WorkerPool, panic_message};
use crate::task::{Callable, InvokePolicy, TaskArgs};

/// Run `callable` with `args` and await its value.
///
/// Cooperative bodies are awaited in place. Blocking bodies run on `pool`,
/// so the awaiting task is never blocked. Errors from the body come back
/// unchanged.
pub async fn invoke(
  callable: &Callable,
  args: TaskArgs,
  pool: &WorkerPool,
) -> Result<Value, BoxError> {
  match callable {
    Callable::Cooperative(body) => body(args).await,
    Callable::Blocking(body) => {
      let body = body.clone();
      let task = args.context().task().to_string();
      pool.run(&task, move || body(args)).await?
    }
  }
}

/// [`invoke`] with per-attempt timeout and retries.
///
/// Runs at most `retries + 1` attempts and returns the last failure.
pub async fn invoke_with_policy(
  task: &str,
  callable: &Callable,
  args: TaskArgs,
  policy: &InvokePolicy,
  pool: &WorkerPool,
) -> Result<Value, BoxError> {
  let attempts = policy.retries.saturating_add(1);
  let mut attempt = 1;
  loop {
    let call = invoke(callable, args.clone(), pool);
    let outcome = match policy.timeout {
      Some(after) => tokio::time::timeout(after, call).await.unwrap_or_else(|_| {
        Err(
          RuntimeError::Timeout {
            task: task.to_string(),
            after,
          }
          .into(),
        )
      }),
      None => call.await,
    };

    match outcome {
      Ok(value) => return Ok(value),
      Err(error) if attempt < attempts => {
        warn!(task, attempt, attempts, error = %error, "task_retrying");
        attempt += 1;
      }
      Err(error) => return Err(error),
    }
  }
}

/// Await `work` unless `cancel` fires first. Panics become errors.
pub(crate) async fn guarded<F>(
  task: &str,
  cancel: CancellationToken,
  work: F,
) -> Result<Value, BoxError>
where
  F: Future<Output = Result<Value, BoxError>>,
{
  let work = AssertUnwindSafe(work).catch_unwind();
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(BoxError::from(RuntimeError::Cancelled { task: task.to_string() })),
    outcome = work => outcome.unwrap_or_else(|payload| {
      Err(
        RuntimeError::Panicked {
          task: task.to_string(),
          message: panic_message(payload.as_ref()),
        }
        .into(),
      )
    }),
  }
}

/// The error for a spawned invocation of `task` that ended without an outcome.
pub(crate) fn join_failure(task: &str, join_error: JoinError) -> RuntimeError {
  match join_error.try_into_panic() {
    Ok(payload) => RuntimeError::Panicked {
      task: task.to_string(),
      message: panic_message(payload.as_ref()),
    },
    Err(_) => RuntimeError::Cancelled {
      task: task.to_string(),
    },
  }
}

/// Everything needed to run one task invocation on a spawned future.
#[derive(Clone)]
pub(crate) struct Invocation {
  pub(crate) task: String,
  pub(crate) callable: Callable,
  pub(crate) policy: InvokePolicy,
  pub(crate) pool: WorkerPool,
  pub(crate) cancel: CancellationToken,
  pub(crate) limits: Option<FanOutLimits>,
}

impl Invocation {
  pub(crate) async fn call(self, args: TaskArgs) -> Result<Value, BoxError> {
    let Invocation {
      task,
      callable,
      policy,
      pool,
      cancel,
      limits,
    } = self;

    guarded(&task, cancel, async {
      let _permit = match &limits {
        Some(limits) => limits.admit().await,
        None => None,
      };
      invoke_with_policy(&task, &callable, args, &policy, &pool).await
    })
    .await
  }
}
