//! Weft Graph
//!
//! This crate turns a set of task signatures into a validated, tiered
//! execution plan. It knows nothing about how tasks run.
//!
//! - Dependencies are inferred from each task's declared input names,
//!   intersected with the names of other tasks and seed values
//! - Unresolved inputs, malformed mapped tasks and cycles are rejected
//!   before anything executes
//! - Tasks are partitioned into tiers: every member of a tier depends only
//!   on seeds and earlier tiers, so a tier can run fully concurrently

mod error;
mod graph;
mod plan;
mod signature;

pub use error::GraphError;
pub use graph::DependencyGraph;
pub use plan::{ExecutionPlan, PlannedTask, TaskShape};
pub use signature::{MapSource, TaskSignature};
