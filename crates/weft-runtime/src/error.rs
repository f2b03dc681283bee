//! Runtime error types.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use weft_graph::GraphError;

/// Error type task bodies fail with. Preserved verbatim by the runtime.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors that can occur while registering, planning or running a weave.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The task set is invalid; nothing was executed.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// A task failed; the original error is inside.
  #[error(transparent)]
  TaskFailed(TaskFailure),

  /// A task was registered twice.
  #[error("task '{name}' is already registered")]
  DuplicateTask { name: String },

  /// `merge` was used with no executing run behind it.
  #[error("merge can only be used inside a running weave: {message}")]
  Context { message: String },

  /// Nested `merge` calls went deeper than the configured bound.
  #[error("merge nesting exceeded the limit of {limit}")]
  RecursionLimit { limit: usize },

  /// A task attempt ran past its timeout.
  #[error("task '{task}' timed out after {after:?}")]
  Timeout { task: String, after: Duration },

  /// An invocation was cancelled because a sibling failed.
  #[error("task '{task}' was cancelled")]
  Cancelled { task: String },

  /// A task body panicked.
  #[error("task '{task}' panicked: {message}")]
  Panicked { task: String, message: String },

  /// A mapped task's source is not a collection.
  #[error("map source for task '{task}' must be an array, found {found}")]
  MapSource { task: String, found: String },

  /// A bound argument is missing or has the wrong shape.
  #[error("argument '{name}': {message}")]
  Argument { name: String, message: String },

  /// A result was written twice.
  #[error("result for '{name}' is already sealed")]
  AlreadySealed { name: String },

  /// The run's worker pool no longer accepts work.
  #[error("worker pool is shut down")]
  PoolClosed,

  /// The weave has already been ended.
  #[error("weave is already closed")]
  Closed,

  /// Invalid configuration value.
  #[error("invalid configuration: {message}")]
  Config { message: String },
}

impl RuntimeError {
  /// The task failure behind this error, if it is one.
  pub fn task_failure(&self) -> Option<&TaskFailure> {
    match self {
      RuntimeError::TaskFailed(failure) => Some(failure),
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, RuntimeError::Cancelled { .. })
  }

  pub fn is_timeout(&self) -> bool {
    matches!(self, RuntimeError::Timeout { .. })
  }
}

/// The first task error of a run, with the name of the task that raised it.
///
/// The same error is both returned from the run and kept on its result,
/// so it stays inspectable after propagation.
#[derive(Debug, Clone)]
pub struct TaskFailure {
  task: String,
  source: Arc<dyn Error + Send + Sync + 'static>,
}

impl TaskFailure {
  pub fn new(task: impl Into<String>, source: BoxError) -> Self {
    Self {
      task: task.into(),
      source: Arc::from(source),
    }
  }

  /// Name of the task that failed.
  pub fn task(&self) -> &str {
    &self.task
  }

  /// The error the task body returned.
  pub fn error(&self) -> &(dyn Error + Send + Sync + 'static) {
    &*self.source
  }

  /// Shared handle to the original error.
  pub fn source_arc(&self) -> Arc<dyn Error + Send + Sync + 'static> {
    Arc::clone(&self.source)
  }

  /// Downcast the original error to a concrete type.
  pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
    self.source.downcast_ref::<E>()
  }
}

impl fmt::Display for TaskFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "task '{}' failed: {}", self.task, self.source)
  }
}

impl Error for TaskFailure {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    Some(&*self.source)
  }
}
