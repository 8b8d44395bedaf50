use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tablecore::{
    ArtifactError, ArtifactStore, NodeContext, NodeError, NodeId, NodeKind, NodeStatus, Runnable,
    WorkflowError,
};
use uuid::Uuid;

/// A pipeline step owned by a workflow.
///
/// Nodes are only built through [`crate::Workflow::add_node`].
pub struct Node {
    id: NodeId,
    name: String,
    created_at: DateTime<Utc>,
    status: NodeStatus,
    output: Option<PathBuf>,
    kind: NodeKind,
    dir: PathBuf,
    runner: Box<dyn Runnable>,
}

/// Serializable view of a node
#[derive(Debug, Clone, Serialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub status: NodeStatus,
    pub table_name: String,
    pub references: Vec<String>,
    pub output: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl Node {
    pub(crate) async fn create(
        name: String,
        kind: NodeKind,
        workflow_root: &Path,
        runner: Box<dyn Runnable>,
    ) -> Result<Self, WorkflowError> {
        let dir = workflow_root.join(&name);
        tokio::fs::create_dir_all(&dir).await?;

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
            status: NodeStatus::Idle,
            output: None,
            kind,
            dir,
            runner,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Artifact written by the last successful run
    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn node_type(&self) -> &str {
        self.runner.node_type()
    }

    pub fn table_name(&self) -> &str {
        self.kind.output_table(&self.name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run the node from its declared inputs.
    ///
    /// On failure the status becomes `Failed`, `output` keeps its previous
    /// value and the error is returned unchanged.
    pub async fn run(&mut self, ctx: &NodeContext) -> Result<PathBuf, NodeError> {
        self.status = NodeStatus::Running;

        match self.runner.run(ctx).await {
            Ok(path) => {
                self.output = Some(path.clone());
                self.status = NodeStatus::Completed;
                Ok(path)
            }
            Err(e) => {
                self.status = NodeStatus::Failed;
                Err(e)
            }
        }
    }

    /// Remove this node's directory and everything in it.
    pub(crate) async fn delete(&self) -> Result<bool, ArtifactError> {
        ArtifactStore::delete(&self.dir).await
    }

    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            id: self.id,
            name: self.name.clone(),
            node_type: self.node_type().to_string(),
            status: self.status,
            table_name: self.table_name().to_string(),
            references: self.kind.references().into_iter().map(String::from).collect(),
            output: self.output.clone(),
            created_at: self.created_at,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("kind", &self.kind)
            .field("output", &self.output)
            .finish()
    }
}
