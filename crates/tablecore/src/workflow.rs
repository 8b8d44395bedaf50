use crate::{NodeStatus, WorkflowError};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub type WorkflowId = Uuid;

/// Parameters of a pipeline step. Immutable once the node is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Parse a CSV source into a table
    Read {
        file_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_name: Option<String>,
    },
    /// Join two upstream tables
    Join {
        left_table: String,
        right_table: String,
        #[serde(deserialize_with = "one_or_many")]
        on: Vec<String>,
        #[serde(default = "default_join_mode")]
        how: String,
    },
    /// Keep the rows of an upstream table matching a predicate
    Filter {
        input_table: String,
        filter_expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table_name: Option<String>,
    },
}

fn default_join_mode() -> String {
    "inner".to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(key) => vec![key],
        OneOrMany::Many(keys) => keys,
    })
}

impl NodeKind {
    pub fn read(file_path: impl Into<PathBuf>) -> Self {
        NodeKind::Read {
            file_path: file_path.into(),
            table_name: None,
        }
    }

    pub fn join(
        left_table: impl Into<String>,
        right_table: impl Into<String>,
        on: Vec<String>,
        how: impl Into<String>,
    ) -> Self {
        NodeKind::Join {
            left_table: left_table.into(),
            right_table: right_table.into(),
            on,
            how: how.into().to_lowercase(),
        }
    }

    pub fn filter(input_table: impl Into<String>, filter_expr: impl Into<String>) -> Self {
        NodeKind::Filter {
            input_table: input_table.into(),
            filter_expr: filter_expr.into(),
            table_name: None,
        }
    }

    /// Kind tag used to look up the node factory
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Read { .. } => "read",
            NodeKind::Join { .. } => "join",
            NodeKind::Filter { .. } => "filter",
        }
    }

    /// Upstream table names this node reads at run time.
    pub fn references(&self) -> Vec<&str> {
        match self {
            NodeKind::Read { .. } => Vec::new(),
            NodeKind::Join {
                left_table,
                right_table,
                ..
            } => vec![left_table.as_str(), right_table.as_str()],
            NodeKind::Filter { input_table, .. } => vec![input_table.as_str()],
        }
    }

    /// Output table name for a node called `node_name`.
    ///
    /// Join results are always named after the node.
    pub fn output_table<'a>(&'a self, node_name: &'a str) -> &'a str {
        match self {
            NodeKind::Read { table_name, .. } | NodeKind::Filter { table_name, .. } => {
                table_name.as_deref().unwrap_or(node_name)
            }
            NodeKind::Join { .. } => node_name,
        }
    }

    /// Canonical form: join modes are matched case-insensitively.
    pub fn normalized(mut self) -> Self {
        if let NodeKind::Join { how, .. } = &mut self {
            *how = how.to_lowercase();
        }
        self
    }
}

/// Node specification as submitted to a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub kind: NodeKind,
}

impl NodeSpec {
    pub fn new(kind: NodeKind) -> Self {
        Self { name: None, kind }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        match &mut self.kind {
            NodeKind::Read { table_name, .. } | NodeKind::Filter { table_name, .. } => {
                *table_name = Some(name.into());
            }
            NodeKind::Join { .. } => {}
        }
        self
    }
}

/// A whole pipeline loaded from a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            nodes: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }
}

/// Aggregate status of a workflow, derived from its nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Empty,
    Idle,
    Running,
    Failed,
    Completed,
    Partial,
}

impl WorkflowStatus {
    /// Fixed precedence: empty, all idle, any running, any failed,
    /// all completed, otherwise partial.
    pub fn from_nodes<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = NodeStatus>,
    {
        let statuses: Vec<NodeStatus> = statuses.into_iter().collect();

        if statuses.is_empty() {
            return WorkflowStatus::Empty;
        }
        if statuses.iter().all(|s| *s == NodeStatus::Idle) {
            return WorkflowStatus::Idle;
        }
        if statuses.contains(&NodeStatus::Running) {
            return WorkflowStatus::Running;
        }
        if statuses.contains(&NodeStatus::Failed) {
            return WorkflowStatus::Failed;
        }
        if statuses.iter().all(|s| *s == NodeStatus::Completed) {
            return WorkflowStatus::Completed;
        }
        WorkflowStatus::Partial
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Empty => "empty",
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Partial => "partial",
        };
        f.write_str(s)
    }
}

/// Names double as directory names, so they must be one path component.
pub fn validate_name(name: &str) -> Result<(), WorkflowError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);

    if invalid {
        Err(WorkflowError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}
