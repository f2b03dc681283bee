//! Tier-by-tier execution of a validated plan.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{error, info, warn};
use weft_graph::{ExecutionPlan, MapSource, TaskShape};

use crate::context::{RunShared, TaskContext};
use crate::error::{BoxError, RuntimeError, TaskFailure};
use crate::invoke::{Invocation, join_failure};
use crate::limits::FanOutLimits;
use crate::task::{Task, TaskArgs};

/// Which result a finished invocation belongs to.
enum Slot {
  Whole(String),
  Item { task: String, index: usize },
}

impl Slot {
  fn task(&self) -> &str {
    match self {
      Slot::Whole(task) | Slot::Item { task, .. } => task,
    }
  }
}

type Outcome = (Slot, Result<Value, BoxError>);

/// Task name of every spawned invocation, by tokio task id.
type Owners = HashMap<Id, String>;

/// Item results of a mapped task still in flight.
struct Gather {
  slots: Vec<Option<Value>>,
  remaining: usize,
  started: Instant,
}

/// A task with its arguments bound, ready to start.
enum Launch<'t> {
  Whole {
    task: &'t Task,
    args: TaskArgs,
  },
  Mapped {
    task: &'t Task,
    args: TaskArgs,
    item_param: String,
    items: Vec<Value>,
  },
}

/// Runs each tier of a plan to completion before starting the next.
pub(crate) struct TieredExecutor<'a> {
  run: &'a Arc<RunShared>,
  plan: &'a ExecutionPlan,
  tasks: &'a HashMap<String, Task>,
}

impl<'a> TieredExecutor<'a> {
  pub(crate) fn new(
    run: &'a Arc<RunShared>,
    plan: &'a ExecutionPlan,
    tasks: &'a HashMap<String, Task>,
  ) -> Self {
    Self { run, plan, tasks }
  }

  pub(crate) async fn execute(&self) -> Result<(), RuntimeError> {
    for (index, tier) in self.plan.tiers().iter().enumerate() {
      info!(run_id = %self.run.run_id, tier = index, tasks = ?tier, "tier_started");
      self.run_tier(tier).await?;
    }
    Ok(())
  }

  async fn run_tier(&self, tier: &[String]) -> Result<(), RuntimeError> {
    let mut set: JoinSet<Outcome> = JoinSet::new();

    // Every launch is prepared before any starts, so a bad map source fails
    // the tier with nothing running.
    let mut launches = Vec::with_capacity(tier.len());
    for name in tier {
      match self.prepare(name) {
        Ok(launch) => launches.push(launch),
        Err(error) => return Err(self.fail(&mut set, name, error.into()).await),
      }
    }

    let mut started: HashMap<String, Instant> = HashMap::new();
    let mut gathers: HashMap<String, Gather> = HashMap::new();
    let mut owners = Owners::new();

    for launch in launches {
      match launch {
        Launch::Whole { task, args } => {
          info!(run_id = %self.run.run_id, task = task.name(), "task_started");
          let slot = Slot::Whole(task.name().to_string());
          let invocation = self.invocation(task, None);
          started.insert(task.name().to_string(), Instant::now());
          let handle = set.spawn(async move { (slot, invocation.call(args).await) });
          owners.insert(handle.id(), task.name().to_string());
        }
        Launch::Mapped {
          task,
          args,
          item_param,
          items,
        } => {
          info!(run_id = %self.run.run_id, task = task.name(), items = items.len(), "task_started");
          if items.is_empty() {
            let sealed = self.seal(task.name(), Value::Array(Vec::new()), Duration::ZERO);
            if let Err((name, error)) = sealed {
              return Err(self.fail(&mut set, &name, error.into()).await);
            }
            continue;
          }

          let limits = FanOutLimits::new(task.worker_limit(), task.rate_limit());
          let limits = (!limits.is_unbounded()).then_some(limits);
          gathers.insert(
            task.name().to_string(),
            Gather {
              slots: vec![None; items.len()],
              remaining: items.len(),
              started: Instant::now(),
            },
          );
          for (index, item) in items.into_iter().enumerate() {
            let slot = Slot::Item {
              task: task.name().to_string(),
              index,
            };
            let invocation = self.invocation(task, limits.clone());
            let args = args
              .clone()
              .with_value(item_param.as_str(), item.clone())
              .with_item(item);
            let handle = set.spawn(async move { (slot, invocation.call(args).await) });
            owners.insert(handle.id(), task.name().to_string());
          }
        }
      }
    }

    while let Some(joined) = set.join_next().await {
      let (slot, outcome) = match joined {
        Ok(done) => done,
        Err(join_error) => {
          let task = owner(&owners, &join_error);
          let error = join_failure(&task, join_error);
          return Err(self.fail(&mut set, &task, error.into()).await);
        }
      };

      let value = match outcome {
        Ok(value) => value,
        Err(error) => return Err(self.fail(&mut set, slot.task(), error).await),
      };

      let sealed = match slot {
        Slot::Whole(name) => {
          let elapsed = started.get(&name).map(Instant::elapsed).unwrap_or_default();
          self.seal(&name, value, elapsed)
        }
        Slot::Item { task, index } => {
          let Some(gather) = gathers.get_mut(&task) else {
            continue;
          };
          gather.slots[index] = Some(value);
          gather.remaining -= 1;
          if gather.remaining > 0 {
            continue;
          }
          let Some(gather) = gathers.remove(&task) else {
            continue;
          };
          let values = gather.slots.into_iter().flatten().collect();
          self.seal(&task, Value::Array(values), gather.started.elapsed())
        }
      };
      if let Err((name, error)) = sealed {
        return Err(self.fail(&mut set, &name, error.into()).await);
      }
    }

    Ok(())
  }

  /// Bind arguments and resolve the item collection for one task.
  fn prepare(&self, name: &str) -> Result<Launch<'a>, RuntimeError> {
    let (Some(task), Some(planned)) = (self.tasks.get(name), self.plan.task(name)) else {
      return Err(RuntimeError::Argument {
        name: name.to_string(),
        message: "task is not registered".to_string(),
      });
    };

    let context = TaskContext::new(Arc::clone(self.run), name, 0);
    let mut args = TaskArgs::new(context);
    for dependency in &planned.dependencies {
      let value = self
        .run
        .store
        .get(dependency)
        .ok_or_else(|| RuntimeError::Argument {
          name: dependency.clone(),
          message: format!("no result available for task '{name}'"),
        })?;
      args = args.with_value(dependency.as_str(), value);
    }

    match &planned.shape {
      TaskShape::Simple => Ok(Launch::Whole { task, args }),
      TaskShape::Mapped { item_param, source } => {
        let items = match (source, task.map_source()) {
          (Some(source), _) => match args.get(source) {
            Some(Value::Array(items)) => items.clone(),
            other => {
              return Err(RuntimeError::MapSource {
                task: name.to_string(),
                found: json_kind(other),
              });
            }
          },
          (None, Some(MapSource::Items(items))) => items.clone(),
          (None, _) => {
            return Err(RuntimeError::MapSource {
              task: name.to_string(),
              found: "nothing".to_string(),
            });
          }
        };
        Ok(Launch::Mapped {
          task,
          args,
          item_param: item_param.clone(),
          items,
        })
      }
    }
  }

  fn invocation(&self, task: &Task, limits: Option<FanOutLimits>) -> Invocation {
    Invocation {
      task: task.name().to_string(),
      callable: task.callable().clone(),
      policy: task.policy(),
      pool: self.run.pool.clone(),
      cancel: self.run.cancel.clone(),
      limits,
    }
  }

  fn seal(
    &self,
    name: &str,
    value: Value,
    elapsed: Duration,
  ) -> Result<(), (String, RuntimeError)> {
    self
      .run
      .store
      .seal(name, value, elapsed)
      .map_err(|e| (name.to_string(), e))?;
    info!(
      run_id = %self.run.run_id,
      task = name,
      elapsed_ms = elapsed.as_millis() as u64,
      "task_completed"
    );
    Ok(())
  }

  /// Cancel everything still running in the tier and wait for it to unwind.
  async fn fail(&self, set: &mut JoinSet<Outcome>, task: &str, error: BoxError) -> RuntimeError {
    let failure = TaskFailure::new(task, error);
    error!(run_id = %self.run.run_id, task, error = %failure.error(), "task_failed");

    self.run.cancel.cancel();
    let in_flight = set.len();
    set.abort_all();
    while set.join_next().await.is_some() {}
    if in_flight > 0 {
      warn!(run_id = %self.run.run_id, in_flight, "in-flight tasks cancelled");
    }

    self.run.store.record_failure(failure.clone());
    RuntimeError::TaskFailed(failure)
  }
}

/// Name of the task whose spawned invocation produced `join_error`.
fn owner(owners: &Owners, join_error: &JoinError) -> String {
  owners
    .get(&join_error.id())
    .cloned()
    .unwrap_or_else(|| "unknown".to_string())
}

fn json_kind(value: Option<&Value>) -> String {
  match value {
    None => "no value",
    Some(Value::Null) => "null",
    Some(Value::Bool(_)) => "a boolean",
    Some(Value::Number(_)) => "a number",
    Some(Value::String(_)) => "a string",
    Some(Value::Array(_)) => "an array",
    Some(Value::Object(_)) => "an object",
  }
  .to_string()
}
