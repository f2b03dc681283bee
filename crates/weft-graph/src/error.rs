use thiserror::Error;

/// Errors raised while turning task signatures into an execution plan.
///
/// Every variant is reported before any task runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error(
    "task '{task}' has unresolved dependencies: {}. Available names: {}",
    .unresolved.join(", "),
    .available.join(", ")
  )]
  UnresolvedDependencies {
    task: String,
    unresolved: Vec<String>,
    available: Vec<String>,
  },

  #[error("mapped task '{task}' must have exactly one item parameter, found {found}")]
  MapShape { task: String, found: usize },

  #[error(
    "circular dependency detected; these tasks form a cycle or depend on one: {}",
    .tasks.join(", ")
  )]
  Cycle { tasks: Vec<String> },

  #[error("name '{0}' is defined more than once")]
  DuplicateName(String),
}

impl GraphError {
  /// Name of the task the error is about, if it concerns a single task.
  pub fn task(&self) -> Option<&str> {
    match self {
      GraphError::UnresolvedDependencies { task, .. } | GraphError::MapShape { task, .. } => {
        Some(task)
      }
      GraphError::Cycle { .. } | GraphError::DuplicateName(_) => None,
    }
  }
}
