//! The weave: registration, planning and the run lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{error, info, instrument};
use uuid::Uuid;
use weft_graph::{ExecutionPlan, TaskSignature};

use crate::config::WeaveConfig;
use crate::context::{RunShared, TaskContext};
use crate::error::RuntimeError;
use crate::executor::TieredExecutor;
use crate::pool::WorkerPool;
use crate::result::WeaveResult;
use crate::store::ResultStore;
use crate::task::Task;

/// Where a weave is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaveState {
  /// Accepting registrations.
  Open,
  /// Every task completed.
  Succeeded,
  /// The task set was rejected; nothing ran.
  GraphFailed,
  /// A task failed; the run was cancelled.
  TaskFailed,
}

impl WeaveState {
  pub fn is_closed(&self) -> bool {
    !matches!(self, WeaveState::Open)
  }
}

/// One orchestration run.
///
/// Tasks and seeds are registered while the weave is open. [`Weave::end`]
/// plans them, runs the plan and closes the weave. The worker pool is
/// created by [`Weave::begin`] and released exactly once, by `end` or on drop.
#[derive(Debug)]
pub struct Weave {
  run: Arc<RunShared>,
  tasks: Vec<Task>,
  seeds: Vec<String>,
  state: WeaveState,
  plan: Option<ExecutionPlan>,
  result: Option<WeaveResult>,
}

impl Weave {
  pub fn begin(config: WeaveConfig) -> Result<Self, RuntimeError> {
    config.validate()?;
    let run_id = Uuid::new_v4().to_string();
    let pool = WorkerPool::new(config.resolved_workers());
    info!(run_id = %run_id, workers = pool.size(), "weave_opened");

    Ok(Self {
      run: Arc::new(RunShared::new(run_id, pool, config.max_merge_depth)),
      tasks: Vec::new(),
      seeds: Vec::new(),
      state: WeaveState::Open,
      plan: None,
      result: None,
    })
  }

  pub fn run_id(&self) -> &str {
    &self.run.run_id
  }

  pub fn state(&self) -> WeaveState {
    self.state
  }

  /// Provide an initial value tasks can declare as an input.
  pub fn seed(&mut self, name: impl Into<String>, value: Value) -> Result<&mut Self, RuntimeError> {
    let name = name.into();
    self.ensure_unregistered(&name)?;
    self.run.store.insert_seed(&name, value)?;
    self.seeds.push(name);
    Ok(self)
  }

  /// Register a task. Names must be unique across tasks and seeds.
  pub fn task(&mut self, task: Task) -> Result<&mut Self, RuntimeError> {
    self.ensure_unregistered(task.name())?;
    self.tasks.push(task);
    Ok(self)
  }

  pub fn task_names(&self) -> impl Iterator<Item = &str> {
    self.tasks.iter().map(Task::name)
  }

  /// Live view of results; usable from outside while the run executes.
  pub fn store(&self) -> ResultStore {
    self.run.store.clone()
  }

  /// Context for merging from code that is not itself a task.
  ///
  /// Merges through it fail unless the run is executing.
  pub fn context(&self) -> TaskContext {
    TaskContext::new(Arc::clone(&self.run), "weave", 0)
  }

  /// The plan of the last `end`, if planning succeeded.
  pub fn plan(&self) -> Option<&ExecutionPlan> {
    self.plan.as_ref()
  }

  /// Results of the last `end`. Present after success and after task failure.
  pub fn result(&self) -> Option<&WeaveResult> {
    self.result.as_ref()
  }

  /// Plan and run every registered task, then close the weave.
  ///
  /// Returns the first task error unchanged (wrapped with the failing task's
  /// name); the same error is kept on [`Weave::result`].
  #[instrument(name = "weave", skip(self), fields(run_id = %self.run.run_id))]
  pub async fn end(&mut self) -> Result<WeaveResult, RuntimeError> {
    if self.state.is_closed() {
      return Err(RuntimeError::Closed);
    }
    let start = Instant::now();
    info!(tasks = self.tasks.len(), seeds = self.seeds.len(), "weave_started");

    let signatures: Vec<TaskSignature> = self.tasks.iter().map(Task::signature).collect();
    let plan = match ExecutionPlan::build(&signatures, &self.seeds) {
      Ok(plan) => plan,
      Err(e) => {
        error!(error = %e, "weave_failed");
        self.close(WeaveState::GraphFailed);
        return Err(e.into());
      }
    };
    info!(tiers = plan.tiers().len(), "weave_planned");

    self.run.store.set_order(plan.order().to_vec());
    let tasks: HashMap<String, Task> = self
      .tasks
      .iter()
      .map(|task| (task.name().to_string(), task.clone()))
      .collect();

    self.run.set_executing(true);
    let outcome = TieredExecutor::new(&self.run, &plan, &tasks).execute().await;
    self.run.set_executing(false);

    let result = self.run.store.snapshot();
    self.plan = Some(plan);
    self.result = Some(result.clone());

    match outcome {
      Ok(()) => {
        info!(
          tasks = result.len(),
          duration_ms = start.elapsed().as_millis() as u64,
          "weave_completed"
        );
        self.close(WeaveState::Succeeded);
        Ok(result)
      }
      Err(e) => {
        error!(error = %e, duration_ms = start.elapsed().as_millis() as u64, "weave_failed");
        self.close(WeaveState::TaskFailed);
        Err(e)
      }
    }
  }

  /// Close the weave without running it and hand `error` back unchanged.
  pub fn abort<E>(&mut self, error: E) -> E {
    if !self.state.is_closed() {
      self.close(WeaveState::GraphFailed);
    }
    error
  }

  fn ensure_unregistered(&self, name: &str) -> Result<(), RuntimeError> {
    if self.state.is_closed() {
      return Err(RuntimeError::Closed);
    }
    if self.seeds.iter().any(|seed| seed == name) || self.tasks.iter().any(|t| t.name() == name) {
      return Err(RuntimeError::DuplicateTask {
        name: name.to_string(),
      });
    }
    Ok(())
  }

  fn close(&mut self, state: WeaveState) {
    self.state = state;
    self.run.cancel.cancel();
    self.run.pool.shutdown();
    self.run.store.close();
  }
}

impl Drop for Weave {
  fn drop(&mut self) {
    self.run.set_executing(false);
    self.run.cancel.cancel();
    self.run.pool.shutdown();
    self.run.store.close();
  }
}

/// Open a weave, let `register` add tasks, then run it.
///
/// An error returned by `register` closes the weave and is returned as is.
pub async fn weave<F, E>(config: WeaveConfig, register: F) -> Result<WeaveResult, E>
where
  F: FnOnce(&mut Weave) -> Result<(), E>,
  E: From<RuntimeError>,
{
  let mut weave = Weave::begin(config)?;
  if let Err(e) = register(&mut weave) {
    return Err(weave.abort(e));
  }
  Ok(weave.end().await?)
}
