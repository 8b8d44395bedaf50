//! Core abstractions for the table pipeline engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the columnar table model, node specifications,
//! the artifact namespace, the tabular engine seam and execution events.

mod artifact;
mod engine;
mod error;
pub mod events;
mod node;
mod table;
mod workflow;

pub use artifact::{ArtifactStore, ARTIFACT_EXTENSION};
pub use engine::{ReadOptions, TabularEngine};
pub use error::{
    ArtifactError, EngineError, ErrorKind, NodeError, PipelineError, WorkflowError,
};
pub use events::*;
pub use node::{NodeContext, NodeId, NodeStatus, Runnable};
pub use table::{Cell, Column, DataType, Table};
pub use workflow::{
    validate_name, NodeKind, NodeSpec, PipelineDefinition, WorkflowId, WorkflowStatus,
};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
