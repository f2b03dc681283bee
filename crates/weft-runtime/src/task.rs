//! Task descriptors, callables and bound arguments.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use weft_graph::{MapSource, TaskSignature};

use crate::context::TaskContext;
use crate::error::{BoxError, RuntimeError};

/// Future returned by a cooperative task body.
pub type TaskFuture = BoxFuture<'static, Result<Value, BoxError>>;

type CooperativeFn = dyn Fn(TaskArgs) -> TaskFuture + Send + Sync;
type BlockingFn = dyn Fn(TaskArgs) -> Result<Value, BoxError> + Send + Sync;

/// A task body.
///
/// Mapped fan-out calls the same body concurrently with itself, so bodies must
/// not rely on per-call mutable state they share.
#[derive(Clone)]
pub enum Callable {
  /// Suspends on the scheduler; awaited in place.
  Cooperative(Arc<CooperativeFn>),
  /// Blocks its thread; run on the weave's worker pool.
  Blocking(Arc<BlockingFn>),
}

impl Callable {
  pub fn cooperative<F, Fut>(body: F) -> Self
  where
    F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
  {
    Callable::Cooperative(Arc::new(move |args| body(args).boxed()))
  }

  pub fn blocking<F>(body: F) -> Self
  where
    F: Fn(TaskArgs) -> Result<Value, BoxError> + Send + Sync + 'static,
  {
    Callable::Blocking(Arc::new(body))
  }

  pub fn is_blocking(&self) -> bool {
    matches!(self, Callable::Blocking(_))
  }
}

impl fmt::Debug for Callable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Callable::Cooperative(_) => f.write_str("Callable::Cooperative"),
      Callable::Blocking(_) => f.write_str("Callable::Blocking"),
    }
  }
}

/// Arguments bound for one invocation.
#[derive(Debug, Clone)]
pub struct TaskArgs {
  values: Arc<HashMap<String, Value>>,
  item: Option<Value>,
  context: TaskContext,
}

impl TaskArgs {
  pub fn new(context: TaskContext) -> Self {
    Self {
      values: Arc::new(HashMap::new()),
      item: None,
      context,
    }
  }

  pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
    Arc::make_mut(&mut self.values).insert(name.into(), value);
    self
  }

  pub fn with_item(mut self, item: Value) -> Self {
    self.item = Some(item);
    self
  }

  /// Raw value bound under `name`.
  pub fn get(&self, name: &str) -> Option<&Value> {
    self.values.get(name)
  }

  /// Value bound under `name`, deserialized.
  pub fn value<T: DeserializeOwned>(&self, name: &str) -> Result<T, RuntimeError> {
    let value = self.values.get(name).ok_or_else(|| RuntimeError::Argument {
      name: name.to_string(),
      message: "not bound".to_string(),
    })?;
    T::deserialize(value).map_err(|e| RuntimeError::Argument {
      name: name.to_string(),
      message: e.to_string(),
    })
  }

  /// The element this invocation was fanned out for, if mapped.
  pub fn item(&self) -> Option<&Value> {
    self.item.as_ref()
  }

  pub fn item_as<T: DeserializeOwned>(&self) -> Result<T, RuntimeError> {
    let item = self.item.as_ref().ok_or_else(|| RuntimeError::Argument {
      name: "item".to_string(),
      message: "invocation is not mapped".to_string(),
    })?;
    T::deserialize(item).map_err(|e| RuntimeError::Argument {
      name: "item".to_string(),
      message: e.to_string(),
    })
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  /// Handle to the run this invocation belongs to.
  pub fn context(&self) -> &TaskContext {
    &self.context
  }
}

/// Retry and timeout applied around every attempt of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokePolicy {
  /// Extra attempts after the first failure.
  pub retries: u32,
  /// Bound on each attempt.
  pub timeout: Option<Duration>,
}

/// A named unit of work registered on a weave.
#[derive(Debug, Clone)]
pub struct Task {
  name: String,
  callable: Callable,
  params: Vec<String>,
  map: Option<MapSource>,
  policy: InvokePolicy,
  workers: Option<usize>,
  limit_per_minute: Option<u32>,
}

impl Task {
  pub fn new(name: impl Into<String>, callable: Callable) -> Self {
    Self {
      name: name.into(),
      callable,
      params: Vec::new(),
      map: None,
      policy: InvokePolicy::default(),
      workers: None,
      limit_per_minute: None,
    }
  }

  pub fn cooperative<F, Fut>(name: impl Into<String>, body: F) -> Self
  where
    F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
  {
    Self::new(name, Callable::cooperative(body))
  }

  pub fn blocking<F>(name: impl Into<String>, body: F) -> Self
  where
    F: Fn(TaskArgs) -> Result<Value, BoxError> + Send + Sync + 'static,
  {
    Self::new(name, Callable::blocking(body))
  }

  /// Declared input names. Those naming tasks or seeds become dependencies;
  /// for a mapped task the single remaining one receives the item.
  pub fn params<I, S>(mut self, params: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.params = params.into_iter().map(Into::into).collect();
    self
  }

  /// Fan out over a literal collection.
  pub fn map_items<I>(mut self, items: I) -> Self
  where
    I: IntoIterator<Item = Value>,
  {
    self.map = Some(MapSource::Items(items.into_iter().collect()));
    self
  }

  /// Fan out over the output of another task or seed.
  pub fn map_over(mut self, task: impl Into<String>) -> Self {
    self.map = Some(MapSource::Task(task.into()));
    self
  }

  pub fn retries(mut self, retries: u32) -> Self {
    self.policy.retries = retries;
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.policy.timeout = Some(timeout);
    self
  }

  /// Cap on concurrently running items of a mapped task.
  pub fn workers(mut self, workers: usize) -> Self {
    self.workers = Some(workers);
    self
  }

  /// Cap on item starts per minute of a mapped task.
  pub fn limit_per_minute(mut self, limit: u32) -> Self {
    self.limit_per_minute = Some(limit);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn callable(&self) -> &Callable {
    &self.callable
  }

  pub fn declared_params(&self) -> &[String] {
    &self.params
  }

  pub fn map_source(&self) -> Option<&MapSource> {
    self.map.as_ref()
  }

  pub fn policy(&self) -> InvokePolicy {
    self.policy
  }

  pub fn worker_limit(&self) -> Option<usize> {
    self.workers
  }

  pub fn rate_limit(&self) -> Option<u32> {
    self.limit_per_minute
  }

  pub fn signature(&self) -> TaskSignature {
    TaskSignature {
      name: self.name.clone(),
      params: self.params.clone(),
      map: self.map.clone(),
    }
  }
}
