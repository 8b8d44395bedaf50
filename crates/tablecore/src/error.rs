use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification shared by every error in the engine.
///
/// Callers (the HTTP layer, the CLI) branch on this instead of matching
/// individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Invalid,
    Resolution,
    Engine,
    Io,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Node(e) => e.kind(),
            PipelineError::Workflow(e) => e.kind(),
            PipelineError::Artifact(e) => e.kind(),
            PipelineError::Io(_) => ErrorKind::Io,
            PipelineError::Serialization(_) => ErrorKind::Invalid,
        }
    }
}

/// Failures raised by a single node run.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Cannot resolve table '{table}': no artifact at {}", .path.display())]
    Resolution { table: String, path: PathBuf },

    #[error("Engine failure: {0}")]
    Engine(#[from] EngineError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NodeError::Resolution { .. } => ErrorKind::Resolution,
            NodeError::Engine(_) => ErrorKind::Engine,
            NodeError::Artifact(e) => e.kind(),
            NodeError::Configuration(_) => ErrorKind::Invalid,
        }
    }
}

/// Errors reported by a tabular engine while reading, filtering or joining.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to read '{}': {message}", .path.display())]
    Source { path: PathBuf, message: String },

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    #[error("Unsupported join mode: {0}")]
    UnsupportedJoin(String),

    #[error("Incompatible join key '{key}': {left} vs {right}")]
    IncompatibleKeys {
        key: String,
        left: String,
        right: String,
    },

    #[error("Engine task failed: {0}")]
    Task(String),
}

/// Errors from the on-disk artifact namespace.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Node folder not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Corrupt artifact {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtifactError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArtifactError::Missing(_) | ArtifactError::DirectoryNotFound(_) => ErrorKind::NotFound,
            ArtifactError::Corrupt { .. } | ArtifactError::Io(_) => ErrorKind::Io,
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Workflow already exists: {0}")]
    AlreadyExists(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    #[error("Invalid name '{0}': must be a single path component")]
    InvalidName(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Invalid node: {0}")]
    Invalid(String),

    #[error("Node '{0}' has no output yet")]
    NoOutput(String),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NotFound(_) | WorkflowError::NodeNotFound(_) => ErrorKind::NotFound,
            WorkflowError::AlreadyExists(_) | WorkflowError::DuplicateNode(_) => {
                ErrorKind::AlreadyExists
            }
            WorkflowError::InvalidName(_)
            | WorkflowError::UnknownNodeType(_)
            | WorkflowError::Invalid(_)
            | WorkflowError::NoOutput(_) => ErrorKind::Invalid,
            WorkflowError::Artifact(e) => e.kind(),
            WorkflowError::Io(_) => ErrorKind::Io,
        }
    }
}
