use crate::{
    events::EventEmitter, ArtifactError, ArtifactStore, EngineError, NodeError, Table,
    TabularEngine,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub type NodeId = Uuid;

/// Lifecycle state of a node.
///
/// `Idle` is initial. Every run passes through `Running` and ends in
/// `Completed` or `Failed`; running again starts over from `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Idle => "idle",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Core trait that all pipeline steps implement
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Kind tag (e.g. "read", "join", "filter")
    fn node_type(&self) -> &str;

    /// Produce this node's artifact and return its path.
    async fn run(&self, ctx: &NodeContext) -> Result<PathBuf, NodeError>;
}

/// Execution context passed to each node run
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,

    pub node_name: String,

    /// Name this node's output is materialized under
    pub table_name: String,

    /// `<workflow_root>/<node_name>`
    pub node_dir: PathBuf,

    pub workflow_root: PathBuf,

    /// Base for relative source paths
    pub project_root: PathBuf,

    pub engine: Arc<dyn TabularEngine>,

    pub store: ArtifactStore,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl NodeContext {
    /// Load an upstream table by name.
    ///
    /// A missing artifact is reported as a resolution failure.
    pub async fn load_table(&self, table_name: &str) -> Result<Table, NodeError> {
        let path = ArtifactStore::resolve(&self.workflow_root, table_name);
        match self.store.load(&path).await {
            Ok(table) => Ok(table),
            Err(ArtifactError::Missing(path)) => Err(NodeError::Resolution {
                table: table_name.to_string(),
                path,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `table` as this node's output.
    pub async fn materialize(&self, table: &Table) -> Result<PathBuf, NodeError> {
        let path = self
            .store
            .materialize(&self.node_dir, &self.table_name, table)
            .await?;
        self.events.info(format!(
            "wrote {} rows to {}",
            table.height(),
            path.display()
        ));
        Ok(path)
    }

    /// Absolute sources are used as given, relative ones hang off the project root.
    pub fn source_path(&self, file_path: &Path) -> PathBuf {
        if file_path.is_absolute() {
            file_path.to_path_buf()
        } else {
            self.project_root.join(file_path)
        }
    }

    /// Run CPU-bound engine work on the blocking pool.
    pub async fn with_engine<T, F>(&self, f: F) -> Result<T, NodeError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TabularEngine) -> Result<T, EngineError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let result = tokio::task::spawn_blocking(move || f(engine.as_ref()))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?;
        Ok(result?)
    }
}
