//! Pipeline execution runtime
//!
//! This crate owns the node state machine, the workflow container and
//! registry, the node-type registry and the executor that runs workflows.

mod executor;
mod loader;
mod node;
mod registry;
mod runtime;
mod workflow;
mod workflows;

#[cfg(test)]
mod testing;

pub use executor::{ExecutionOrder, ExecutionPlan, NodeFailure, RunReport, WorkflowExecutor};
pub use loader::PipelineLoader;
pub use node::{Node, NodeInfo};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry, ParamDefinition};
pub use runtime::{ConfigError, PipelineRuntime, RuntimeConfig};
pub use workflow::{Workflow, WorkflowExport, WorkflowSummary};
pub use workflows::{SharedWorkflow, WorkflowRegistry};
