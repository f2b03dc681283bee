use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::error::GraphError;
use crate::graph::DependencyGraph;
use crate::signature::{MapSource, TaskSignature};

/// How a planned task is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskShape {
  /// Invoked once with its dependencies bound.
  Simple,
  /// Invoked once per item; `item_param` receives the element.
  Mapped {
    item_param: String,
    /// Producing task or seed, when the items come from another result.
    source: Option<String>,
  },
}

/// A task after validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTask {
  pub name: String,
  /// Names bound as arguments: other tasks and seeds.
  pub dependencies: BTreeSet<String>,
  pub shape: TaskShape,
}

/// Ordered concurrency tiers over a validated task set.
///
/// Every task's dependencies are satisfied by seeds or by earlier tiers.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
  tiers: Vec<Vec<String>>,
  tasks: HashMap<String, PlannedTask>,
  order: Vec<String>,
  seeds: Vec<String>,
  #[serde(skip)]
  graph: DependencyGraph,
}

impl ExecutionPlan {
  /// Validate `signatures` against each other and `seeds`, then tier them.
  pub fn build(signatures: &[TaskSignature], seeds: &[String]) -> Result<Self, GraphError> {
    let mut known: HashSet<&str> = HashSet::with_capacity(signatures.len() + seeds.len());
    for name in seeds
      .iter()
      .map(String::as_str)
      .chain(signatures.iter().map(|s| s.name.as_str()))
    {
      if !known.insert(name) {
        return Err(GraphError::DuplicateName(name.to_string()));
      }
    }
    let task_names: HashSet<&str> = signatures.iter().map(|s| s.name.as_str()).collect();

    let mut tasks = HashMap::with_capacity(signatures.len());
    let mut edges = Vec::with_capacity(signatures.len());
    for signature in signatures {
      let planned = resolve(signature, &known)?;
      let task_deps = planned
        .dependencies
        .iter()
        .filter(|dep| task_names.contains(dep.as_str()))
        .cloned()
        .collect();
      edges.push((signature.name.clone(), task_deps));
      tasks.insert(signature.name.clone(), planned);
    }

    let order: Vec<String> = signatures.iter().map(|s| s.name.clone()).collect();
    let graph = DependencyGraph::new(&edges);
    let (tiers, stuck) = graph.tiers(&order);
    if !stuck.is_empty() {
      return Err(GraphError::Cycle { tasks: stuck });
    }

    Ok(Self {
      tiers,
      tasks,
      order,
      seeds: seeds.to_vec(),
      graph,
    })
  }

  pub fn tiers(&self) -> &[Vec<String>] {
    &self.tiers
  }

  pub fn task(&self, name: &str) -> Option<&PlannedTask> {
    self.tasks.get(name)
  }

  /// Argument dependencies of `name` (tasks and seeds).
  pub fn dependencies(&self, name: &str) -> Option<&BTreeSet<String>> {
    self.tasks.get(name).map(|task| &task.dependencies)
  }

  /// Tasks that consume the output of `name`.
  pub fn dependents(&self, name: &str) -> Vec<&str> {
    self.graph.downstream(name).collect()
  }

  pub fn tier_of(&self, name: &str) -> Option<usize> {
    self
      .tiers
      .iter()
      .position(|tier| tier.iter().any(|member| member == name))
  }

  /// Task names in definition order.
  pub fn order(&self) -> &[String] {
    &self.order
  }

  pub fn seeds(&self) -> &[String] {
    &self.seeds
  }

  pub fn graph(&self) -> &DependencyGraph {
    &self.graph
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }
}

/// Split a signature's params into dependencies and, for mapped tasks, the item param.
fn resolve(signature: &TaskSignature, known: &HashSet<&str>) -> Result<PlannedTask, GraphError> {
  let (dependencies, free): (Vec<&String>, Vec<&String>) = signature
    .params
    .iter()
    .partition(|param| known.contains(param.as_str()));
  let mut dependencies: BTreeSet<String> = dependencies.into_iter().cloned().collect();

  let shape = match &signature.map {
    None => {
      if !free.is_empty() {
        return Err(unresolved(signature, free.into_iter().cloned().collect(), known));
      }
      TaskShape::Simple
    }
    Some(source) => {
      let source = match source {
        MapSource::Items(_) => None,
        MapSource::Task(name) if known.contains(name.as_str()) => {
          dependencies.insert(name.clone());
          Some(name.clone())
        }
        MapSource::Task(name) => {
          return Err(unresolved(signature, vec![name.clone()], known));
        }
      };
      match free.as_slice() {
        [item] => TaskShape::Mapped {
          item_param: item.to_string(),
          source,
        },
        _ => {
          return Err(GraphError::MapShape {
            task: signature.name.clone(),
            found: free.len(),
          });
        }
      }
    }
  };

  Ok(PlannedTask {
    name: signature.name.clone(),
    dependencies,
    shape,
  })
}

fn unresolved(signature: &TaskSignature, names: Vec<String>, known: &HashSet<&str>) -> GraphError {
  let mut available: Vec<String> = known.iter().map(|name| name.to_string()).collect();
  available.sort();
  GraphError::UnresolvedDependencies {
    task: signature.name.clone(),
    unresolved: names,
    available,
  }
}
