//! Shared result store for one run.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;

use crate::error::{RuntimeError, TaskFailure};
use crate::result::WeaveResult;

/// Name to value map written once per task and readable from any task.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
  inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
  state: RwLock<StoreState>,
  changed: watch::Sender<u64>,
}

impl Default for StoreInner {
  fn default() -> Self {
    Self {
      state: RwLock::default(),
      changed: watch::channel(0).0,
    }
  }
}

#[derive(Debug, Default)]
struct StoreState {
  order: Vec<String>,
  seeds: HashMap<String, Value>,
  values: HashMap<String, Value>,
  timings: HashMap<String, Duration>,
  failure: Option<TaskFailure>,
  closed: bool,
}

impl StoreState {
  fn lookup(&self, name: &str) -> Option<&Value> {
    self.values.get(name).or_else(|| self.seeds.get(name))
  }
}

impl ResultStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Value for `name`, whether a task result or a seed.
  pub fn get(&self, name: &str) -> Option<Value> {
    self.read().lookup(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.read().lookup(name).is_some()
  }

  /// Number of sealed task results.
  pub fn len(&self) -> usize {
    self.read().values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().values.is_empty()
  }

  pub fn is_closed(&self) -> bool {
    self.read().closed
  }

  pub fn failure(&self) -> Option<TaskFailure> {
    self.read().failure.clone()
  }

  /// Wait until `name` has a value. Returns `None` if the store closes first.
  pub async fn wait_for(&self, name: &str) -> Option<Value> {
    let mut changes = self.inner.changed.subscribe();
    loop {
      {
        let state = self.read();
        if let Some(value) = state.lookup(name) {
          return Some(value.clone());
        }
        if state.closed {
          return None;
        }
      }
      if changes.changed().await.is_err() {
        return self.get(name);
      }
    }
  }

  /// Point-in-time copy of everything written so far.
  pub fn snapshot(&self) -> WeaveResult {
    let state = self.read();
    let mut results = state.seeds.clone();
    results.extend(state.values.iter().map(|(k, v)| (k.clone(), v.clone())));
    WeaveResult::new(
      state.order.clone(),
      results,
      state.timings.clone(),
      state.failure.clone(),
    )
  }

  pub(crate) fn set_order(&self, order: Vec<String>) {
    self.write().order = order;
  }

  pub(crate) fn insert_seed(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
    {
      let mut state = self.write();
      if state.lookup(name).is_some() {
        return Err(RuntimeError::AlreadySealed {
          name: name.to_string(),
        });
      }
      state.seeds.insert(name.to_string(), value);
    }
    self.notify();
    Ok(())
  }

  /// Write a task's value. Each name is written at most once.
  pub(crate) fn seal(
    &self,
    name: &str,
    value: Value,
    elapsed: Duration,
  ) -> Result<(), RuntimeError> {
    {
      let mut state = self.write();
      if state.closed || state.lookup(name).is_some() {
        return Err(RuntimeError::AlreadySealed {
          name: name.to_string(),
        });
      }
      state.values.insert(name.to_string(), value);
      state.timings.insert(name.to_string(), elapsed);
    }
    self.notify();
    Ok(())
  }

  /// Keep `failure` unless an earlier one is already recorded.
  pub(crate) fn record_failure(&self, failure: TaskFailure) {
    let mut state = self.write();
    if state.failure.is_none() {
      state.failure = Some(failure);
    }
  }

  /// Refuse further writes and wake every waiter.
  pub(crate) fn close(&self) {
    self.write().closed = true;
    self.notify();
  }

  fn notify(&self) {
    self.inner.changed.send_modify(|version| *version += 1);
  }

  fn read(&self) -> RwLockReadGuard<'_, StoreState> {
    self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
    self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
  }
}
