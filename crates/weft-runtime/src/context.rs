//! Per-run state reachable from inside task bodies, and dynamic merge.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{BoxError, RuntimeError};
use crate::invoke::{Invocation, join_failure};
use crate::pool::WorkerPool;
use crate::store::ResultStore;
use crate::task::{Callable, InvokePolicy, TaskArgs};

/// State owned by one run and shared by every task in it.
#[derive(Debug)]
pub(crate) struct RunShared {
  pub(crate) run_id: String,
  pub(crate) pool: WorkerPool,
  pub(crate) cancel: CancellationToken,
  pub(crate) store: ResultStore,
  pub(crate) max_merge_depth: usize,
  executing: AtomicBool,
}

impl RunShared {
  pub(crate) fn new(run_id: String, pool: WorkerPool, max_merge_depth: usize) -> Self {
    Self {
      run_id,
      pool,
      cancel: CancellationToken::new(),
      store: ResultStore::new(),
      max_merge_depth,
      executing: AtomicBool::new(false),
    }
  }

  pub(crate) fn set_executing(&self, executing: bool) {
    self.executing.store(executing, Ordering::Release);
  }

  pub(crate) fn is_executing(&self) -> bool {
    self.executing.load(Ordering::Acquire)
  }
}

/// Handle a task body uses to reach its run.
///
/// Carried in [`TaskArgs`]. Merges made through it run under the same worker
/// pool and cancellation as the task itself, and count towards the nesting
/// bound.
#[derive(Debug, Clone)]
pub struct TaskContext {
  run: Arc<RunShared>,
  task: Arc<str>,
  depth: usize,
}

impl TaskContext {
  pub(crate) fn new(run: Arc<RunShared>, task: &str, depth: usize) -> Self {
    Self {
      run,
      task: Arc::from(task),
      depth,
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run.run_id
  }

  /// Name of the task this context was handed to.
  pub fn task(&self) -> &str {
    &self.task
  }

  /// Number of enclosing merges.
  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn results(&self) -> &ResultStore {
    &self.run.store
  }

  pub fn is_cancelled(&self) -> bool {
    self.run.cancel.is_cancelled()
  }

  /// Resolves once the run is cancelled.
  pub async fn cancelled(&self) {
    self.run.cancel.cancelled().await
  }

  /// Invoke `callable` once from inside a running task and await its value.
  ///
  /// The call runs as its own tokio task, so nested merges do not share a
  /// stack. Errors raised by `callable` come back as they were raised.
  #[instrument(name = "merge", skip(self, callable), fields(run_id = %self.run.run_id, task = %self.task, depth = self.depth))]
  pub async fn merge(&self, callable: Callable) -> Result<Value, BoxError> {
    let child = self.enter()?;
    debug!("merge_started");

    // Dropping the set aborts the call if the caller goes away.
    let mut set = JoinSet::new();
    let invocation = self.invocation(callable, self.run.cancel.clone());
    set.spawn(invocation.call(TaskArgs::new(child)));
    match set.join_next().await {
      Some(Ok(outcome)) => outcome,
      Some(Err(join_error)) => Err(BoxError::from(join_failure(&self.task, join_error))),
      None => Err(BoxError::from(RuntimeError::Cancelled {
        task: self.task.to_string(),
      })),
    }
  }

  /// Invoke `callable` once per item, concurrently, and collect the values in
  /// item order.
  ///
  /// The first failure cancels the remaining items and is returned.
  #[instrument(name = "merge_map", skip(self, callable, items), fields(run_id = %self.run.run_id, task = %self.task, depth = self.depth))]
  pub async fn merge_map<I>(&self, callable: Callable, items: I) -> Result<Vec<Value>, BoxError>
  where
    I: IntoIterator<Item = Value>,
  {
    let child = self.enter()?;
    let items: Vec<Value> = items.into_iter().collect();
    debug!(items = items.len(), "merge_started");

    let cancel = self.run.cancel.child_token();
    let mut set = JoinSet::new();
    let mut slots: Vec<Option<Value>> = vec![None; items.len()];
    for (index, item) in items.into_iter().enumerate() {
      let invocation = self.invocation(callable.clone(), cancel.clone());
      let args = TaskArgs::new(child.clone()).with_item(item);
      set.spawn(async move { (index, invocation.call(args).await) });
    }

    while let Some(joined) = set.join_next().await {
      let outcome = match joined {
        Ok((index, Ok(value))) => {
          slots[index] = Some(value);
          continue;
        }
        Ok((_, Err(error))) => error,
        Err(join_error) => BoxError::from(join_failure(&self.task, join_error)),
      };
      cancel.cancel();
      set.abort_all();
      while set.join_next().await.is_some() {}
      return Err(outcome);
    }

    Ok(slots.into_iter().flatten().collect())
  }

  /// Context for a nested invocation, if the run allows one.
  fn enter(&self) -> Result<TaskContext, RuntimeError> {
    if !self.run.is_executing() {
      return Err(RuntimeError::Context {
        message: format!("run {} is not executing", self.run.run_id),
      });
    }
    if self.depth >= self.run.max_merge_depth {
      return Err(RuntimeError::RecursionLimit {
        limit: self.run.max_merge_depth,
      });
    }
    Ok(Self {
      run: Arc::clone(&self.run),
      task: Arc::clone(&self.task),
      depth: self.depth + 1,
    })
  }

  fn invocation(&self, callable: Callable, cancel: CancellationToken) -> Invocation {
    Invocation {
      task: self.task.to_string(),
      callable,
      policy: InvokePolicy::default(),
      pool: self.run.pool.clone(),
      cancel,
      limits: None,
    }
  }
}
