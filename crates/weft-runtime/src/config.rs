//! Weave configuration.

use std::num::NonZero;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Default bound on nested `merge` calls.
pub const DEFAULT_MAX_MERGE_DEPTH: usize = 100;

/// Configuration for a single weave run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
  /// Worker threads available to blocking tasks. `None` picks a default from
  /// the available parallelism.
  pub max_workers: Option<usize>,

  /// How deep `merge` calls may nest before failing.
  pub max_merge_depth: usize,
}

impl Default for WeaveConfig {
  fn default() -> Self {
    Self {
      max_workers: None,
      max_merge_depth: DEFAULT_MAX_MERGE_DEPTH,
    }
  }
}

impl WeaveConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_max_workers(mut self, max_workers: usize) -> Self {
    self.max_workers = Some(max_workers);
    self
  }

  pub fn with_max_merge_depth(mut self, depth: usize) -> Self {
    self.max_merge_depth = depth;
    self
  }

  pub fn validate(&self) -> Result<(), RuntimeError> {
    if self.max_workers == Some(0) {
      return Err(RuntimeError::Config {
        message: "max_workers must be greater than 0".to_string(),
      });
    }
    if self.max_merge_depth == 0 {
      return Err(RuntimeError::Config {
        message: "max_merge_depth must be greater than 0".to_string(),
      });
    }
    Ok(())
  }

  /// Worker count after applying the default.
  pub fn resolved_workers(&self) -> usize {
    self.max_workers.unwrap_or_else(default_workers)
  }
}

/// Matches the usual thread-pool default: available parallelism plus four, capped at 32.
fn default_workers() -> usize {
  let cpus = std::thread::available_parallelism()
    .map(NonZero::get)
    .unwrap_or(1);
  (cpus + 4).min(32)
}
