//! Weft Runtime
//!
//! Runs a set of named tasks as a concurrent, dependency-ordered weave.
//!
//! - A [`Weave`] collects tasks and seed values, plans them with
//!   `weft-graph`, and executes the plan tier by tier
//! - Cooperative bodies are awaited in place; blocking bodies run on a
//!   worker pool owned by the run, sized by [`WeaveConfig::max_workers`]
//! - Mapped tasks fan out once per item and gather their values in item
//!   order, optionally bounded by a worker cap and a per-minute start rate
//! - The first task failure cancels everything still running and is
//!   returned unchanged; tasks already finished keep their results
//! - Running tasks can schedule more work on the same run through
//!   [`TaskContext::merge`] and [`TaskContext::merge_map`]
//!
//! ```text
//! Weave::begin ──► seed / task ──► end ──► ExecutionPlan::build
//!                                            │
//!                              tier 0 ──► tier 1 ──► ... ──► WeaveResult
//!                              (JoinSet)   (JoinSet)
//! ```

mod config;
mod context;
mod error;
mod executor;
mod invoke;
mod limits;
mod pool;
mod result;
mod store;
mod task;
mod weave;

pub use config::{DEFAULT_MAX_MERGE_DEPTH, WeaveConfig};
pub use context::TaskContext;
pub use error::{BoxError, RuntimeError, TaskFailure};
pub use invoke::{invoke, invoke_with_policy};
pub use pool::WorkerPool;
pub use result::WeaveResult;
pub use store::ResultStore;
pub use task::{Callable, InvokePolicy, Task, TaskArgs, TaskFuture};
pub use weave::{Weave, WeaveState, weave};

pub use weft_graph::{ExecutionPlan, GraphError, MapSource, PlannedTask, TaskShape};
