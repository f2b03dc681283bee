use serde::{Deserialize, Serialize};

/// Where a mapped task draws its items from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSource {
  /// A literal collection supplied at registration.
  Items(Vec<serde_json::Value>),
  /// The output of another task (or seed), which must be an array.
  Task(String),
}

impl MapSource {
  /// The producing task name, when mapping over another task's output.
  pub fn task_name(&self) -> Option<&str> {
    match self {
      MapSource::Items(_) => None,
      MapSource::Task(name) => Some(name),
    }
  }
}

/// The part of a task the graph builder looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSignature {
  pub name: String,
  /// Declared input names, in declaration order.
  pub params: Vec<String>,
  pub map: Option<MapSource>,
}

impl TaskSignature {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      params: Vec::new(),
      map: None,
    }
  }

  pub fn with_params<I, S>(mut self, params: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.params = params.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_map(mut self, source: MapSource) -> Self {
    self.map = Some(source);
    self
  }

  pub fn is_mapped(&self) -> bool {
    self.map.is_some()
  }
}
