use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

/// Task-to-task dependency structure for traversal and analysis.
///
/// Seeds are not nodes here; they are satisfied before anything runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
  /// Adjacency list: task -> tasks that consume its output.
  downstream: HashMap<String, BTreeSet<String>>,
  /// Reverse adjacency: task -> tasks whose output it consumes.
  upstream: HashMap<String, BTreeSet<String>>,
  /// Tasks with no task dependencies, in definition order.
  entry_points: Vec<String>,
}

impl DependencyGraph {
  /// Build a graph from `(task, task dependencies)` pairs given in definition order.
  pub fn new(tasks: &[(String, BTreeSet<String>)]) -> Self {
    let mut downstream: HashMap<String, BTreeSet<String>> = HashMap::new();
    let mut upstream: HashMap<String, BTreeSet<String>> = HashMap::new();

    for (name, _) in tasks {
      downstream.entry(name.clone()).or_default();
      upstream.entry(name.clone()).or_default();
    }

    for (name, deps) in tasks {
      for dep in deps {
        downstream.entry(dep.clone()).or_default().insert(name.clone());
        upstream.entry(name.clone()).or_default().insert(dep.clone());
      }
    }

    let entry_points = tasks
      .iter()
      .filter(|(name, _)| upstream.get(name).is_none_or(|deps| deps.is_empty()))
      .map(|(name, _)| name.clone())
      .collect();

    Self {
      downstream,
      upstream,
      entry_points,
    }
  }

  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  /// Tasks that consume the output of `task`.
  pub fn downstream(&self, task: &str) -> impl Iterator<Item = &str> {
    self
      .downstream
      .get(task)
      .into_iter()
      .flatten()
      .map(String::as_str)
  }

  /// Tasks whose output `task` consumes.
  pub fn upstream(&self, task: &str) -> impl Iterator<Item = &str> {
    self
      .upstream
      .get(task)
      .into_iter()
      .flatten()
      .map(String::as_str)
  }

  pub fn in_degree(&self, task: &str) -> usize {
    self.upstream.get(task).map_or(0, BTreeSet::len)
  }

  pub fn contains(&self, task: &str) -> bool {
    self.upstream.contains_key(task)
  }

  /// Partition tasks into tiers by repeatedly taking the zero in-degree frontier.
  ///
  /// Returns the tiers and whatever could not be placed (non-empty iff there is a cycle).
  pub(crate) fn tiers(&self, order: &[String]) -> (Vec<Vec<String>>, Vec<String>) {
    let mut in_degree: HashMap<&str, usize> = order
      .iter()
      .map(|name| (name.as_str(), self.in_degree(name)))
      .collect();

    let mut tiers = Vec::new();
    let mut frontier: Vec<&str> = order
      .iter()
      .map(String::as_str)
      .filter(|name| in_degree.get(name) == Some(&0))
      .collect();

    while !frontier.is_empty() {
      let mut next = BTreeSet::new();
      for name in &frontier {
        for dependent in self.downstream(name) {
          if let Some(degree) = in_degree.get_mut(dependent) {
            *degree -= 1;
            if *degree == 0 {
              next.insert(dependent);
            }
          }
        }
      }
      tiers.push(frontier.iter().map(|name| name.to_string()).collect());
      // Keep definition order inside a tier for stable reporting.
      frontier = order
        .iter()
        .map(String::as_str)
        .filter(|name| next.contains(name))
        .collect();
    }

    let placed: BTreeSet<&str> = tiers.iter().flatten().map(String::as_str).collect();
    let mut stuck: Vec<String> = order
      .iter()
      .filter(|name| !placed.contains(name.as_str()))
      .cloned()
      .collect();
    stuck.sort();

    (tiers, stuck)
  }
}
