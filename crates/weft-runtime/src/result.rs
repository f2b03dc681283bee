//! The outcome of a weave run.

use std::collections::HashMap;
use std::ops::Index;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{RuntimeError, TaskFailure};

/// Results of a finished (or failed) run, keyed by task name.
///
/// Holds every task that completed before the run ended, plus seeds. On
/// failure the first task error is kept in [`WeaveResult::exception`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeaveResult {
  order: Vec<String>,
  results: HashMap<String, Value>,
  timings: HashMap<String, Duration>,
  #[serde(skip)]
  failure: Option<TaskFailure>,
}

impl WeaveResult {
  pub(crate) fn new(
    order: Vec<String>,
    results: HashMap<String, Value>,
    timings: HashMap<String, Duration>,
    failure: Option<TaskFailure>,
  ) -> Self {
    Self {
      order,
      results,
      timings,
      failure,
    }
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.results.get(name)
  }

  pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, RuntimeError> {
    let value = self.results.get(name).ok_or_else(|| RuntimeError::Argument {
      name: name.to_string(),
      message: "no result".to_string(),
    })?;
    T::deserialize(value).map_err(|e| RuntimeError::Argument {
      name: name.to_string(),
      message: e.to_string(),
    })
  }

  pub fn contains(&self, name: &str) -> bool {
    self.results.contains_key(name)
  }

  /// Completed tasks in definition order, with their values.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
    self
      .order
      .iter()
      .filter_map(|name| self.results.get(name).map(|value| (name.as_str(), value)))
  }

  pub fn values(&self) -> impl Iterator<Item = &Value> {
    self.iter().map(|(_, value)| value)
  }

  /// Task names in definition order, completed or not.
  pub fn names(&self) -> &[String] {
    &self.order
  }

  /// Output of the last task in definition order, if it completed.
  pub fn final_value(&self) -> Option<&Value> {
    self.order.last().and_then(|name| self.results.get(name))
  }

  pub fn timing(&self, name: &str) -> Option<Duration> {
    self.timings.get(name).copied()
  }

  pub fn timings(&self) -> &HashMap<String, Duration> {
    &self.timings
  }

  /// First task failure of the run.
  pub fn exception(&self) -> Option<&TaskFailure> {
    self.failure.as_ref()
  }

  pub fn is_success(&self) -> bool {
    self.failure.is_none()
  }

  /// Number of completed tasks. Seeds are not counted.
  pub fn len(&self) -> usize {
    self.iter().count()
  }

  pub fn is_empty(&self) -> bool {
    self.iter().next().is_none()
  }
}

impl Index<&str> for WeaveResult {
  type Output = Value;

  /// Panics when `name` has no result.
  fn index(&self, name: &str) -> &Value {
    match self.results.get(name) {
      Some(value) => value,
      None => panic!("no result for task '{name}'"),
    }
  }
}
