use crate::node::{Node, NodeInfo};
use crate::registry::NodeRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tablecore::{
    validate_name, ArtifactStore, NodeSpec, NodeStatus, WorkflowError, WorkflowId, WorkflowStatus,
};
use uuid::Uuid;

/// An ordered, named set of nodes sharing one artifact root.
///
/// Insertion order is the default execution order. The aggregate status is
/// always computed from the nodes, never stored.
#[derive(Debug)]
pub struct Workflow {
    id: WorkflowId,
    name: String,
    created_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failed_nodes: Vec<String>,
    nodes: Vec<Node>,
    root: PathBuf,
}

/// Row in a workflow listing
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub status: WorkflowStatus,
    pub nodes: usize,
    pub last_run_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_nodes: Vec<String>,
}

/// Full workflow metadata
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowExport {
    pub id: WorkflowId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub status: WorkflowStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_nodes: Vec<String>,
    pub nodes: Vec<NodeInfo>,
}

impl Workflow {
    /// Create a workflow rooted at `root`.
    ///
    /// Any existing directory at `root` is destroyed and recreated empty.
    pub async fn create(name: impl Into<String>, root: PathBuf) -> Result<Self, WorkflowError> {
        let name = name.into();
        validate_name(&name)?;

        if ArtifactStore::delete(&root).await? {
            tracing::warn!("Replaced existing artifact root {}", root.display());
        }
        tokio::fs::create_dir_all(&root).await?;

        Ok(Self {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
            last_run_at: None,
            completed_at: None,
            failed_nodes: Vec::new(),
            nodes: Vec::new(),
            root,
        })
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Nodes that failed during the most recent full run
    pub fn failed_nodes(&self) -> &[String] {
        &self.failed_nodes
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus::from_nodes(self.nodes.iter().map(Node::status))
    }

    /// Append a node built from `spec`.
    ///
    /// Without a name the node is called `node<N>`, N being the new length
    /// of the sequence. Referenced tables are not checked until run time.
    pub async fn add_node(
        &mut self,
        spec: NodeSpec,
        factories: &NodeRegistry,
    ) -> Result<&Node, WorkflowError> {
        let name = spec
            .name
            .unwrap_or_else(|| format!("node{}", self.nodes.len() + 1));
        validate_name(&name)?;

        if self.node(&name).is_some() {
            return Err(WorkflowError::DuplicateNode(name));
        }

        let kind = spec.kind.normalized();
        let runner = factories.create_node(&kind)?;
        let node = Node::create(name, kind, &self.root, runner).await?;

        tracing::debug!(
            "Added {} node '{}' to workflow '{}'",
            node.node_type(),
            node.name(),
            self.name
        );
        self.nodes.push(node);
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// Remove a node's artifact directory and drop it from the sequence.
    ///
    /// Downstream nodes referencing its table are left as they are and will
    /// fail to resolve on their next run.
    pub async fn delete_node(&mut self, name: &str) -> Result<(), WorkflowError> {
        let idx = self
            .position(name)
            .ok_or_else(|| WorkflowError::NodeNotFound(name.to_string()))?;

        self.nodes[idx].delete().await?;
        self.nodes.remove(idx);
        self.failed_nodes.retain(|n| n != name);

        tracing::debug!("Deleted node '{}' from workflow '{}'", name, self.name);
        Ok(())
    }

    /// Remove the files in `<root>/<name>/`, keeping the folder.
    ///
    /// Works on the directory alone, so folders left behind by nodes that
    /// are no longer registered can be cleared too.
    pub async fn clear_node(&self, name: &str) -> Result<usize, WorkflowError> {
        validate_name(name)?;
        Ok(ArtifactStore::clear(&self.root.join(name)).await?)
    }

    /// Delete the whole artifact root. Returns false if it was already gone.
    pub async fn remove(&self) -> Result<bool, WorkflowError> {
        Ok(ArtifactStore::delete(&self.root).await?)
    }

    pub(crate) fn begin_run(&mut self) {
        self.last_run_at = Some(Utc::now());
        self.failed_nodes.clear();
    }

    pub(crate) fn record_failure(&mut self, node: &str) {
        self.failed_nodes.push(node.to_string());
    }

    /// Stamp `completed_at` when every node completed.
    pub(crate) fn finish_run(&mut self) {
        if self.nodes.iter().all(|n| n.status() == NodeStatus::Completed) {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id,
            name: self.name.clone(),
            status: self.status(),
            nodes: self.nodes.len(),
            last_run_at: self.last_run_at,
            completed_at: self.completed_at,
            failed_nodes: self.failed_nodes.clone(),
        }
    }

    pub fn export(&self) -> WorkflowExport {
        WorkflowExport {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            status: self.status(),
            last_run_at: self.last_run_at,
            completed_at: self.completed_at,
            failed_nodes: self.failed_nodes.clone(),
            nodes: self.nodes.iter().map(Node::info).collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.name() == name)
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Workflow '{}'", self.name)?;
        writeln!(f, "  ID: {}", self.id)?;
        writeln!(f, "  Created: {}", self.created_at)?;
        writeln!(f, "  Status: {}", self.status())?;
        writeln!(f, "  Path: {}", self.root.display())?;
        write!(f, "  Nodes: {}", self.nodes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::stub_registry;
    use pretty_assertions::assert_eq;
    use tablecore::NodeKind;

    async fn workflow(dir: &tempfile::TempDir) -> Workflow {
        Workflow::create("w", dir.path().join("w")).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_recreates_root_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("w");
        std::fs::create_dir_all(root.join("stale")).unwrap();
        std::fs::write(root.join("stale/old.parquet"), b"x").unwrap();

        let wf = Workflow::create("w", root.clone()).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        assert_eq!(wf.status(), WorkflowStatus::Empty);
        assert!(wf.last_run_at().is_none());
        assert!(wf.completed_at().is_none());
    }

    #[tokio::test]
    async fn test_add_node_default_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = workflow(&dir).await;
        let registry = stub_registry();

        let first = wf
            .add_node(NodeSpec::new(NodeKind::read("a.csv")), &registry)
            .await
            .unwrap();
        assert_eq!(first.name(), "node1");
        assert!(first.dir().is_dir());

        wf.add_node(NodeSpec::new(NodeKind::read("b.csv")).with_name("b"), &registry)
            .await
            .unwrap();
        let third = wf
            .add_node(NodeSpec::new(NodeKind::filter("b", "x > 1")), &registry)
            .await
            .unwrap();
        assert_eq!(third.name(), "node3");

        let names: Vec<&str> = wf.nodes().iter().map(Node::name).collect();
        assert_eq!(names, vec!["node1", "b", "node3"]);
        assert_eq!(wf.status(), WorkflowStatus::Idle);
    }

    #[tokio::test]
    async fn test_add_node_rejects_duplicates_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = workflow(&dir).await;
        let registry = stub_registry();
        let spec = NodeSpec::new(NodeKind::read("a.csv")).with_name("a");

        wf.add_node(spec.clone(), &registry).await.unwrap();
        let err = wf.add_node(spec, &registry).await.unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateNode(ref n) if n == "a"));

        let err = wf
            .add_node(NodeSpec::new(NodeKind::read("a.csv")).with_name("../x"), &registry)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidName(_)));
        assert_eq!(wf.nodes().len(), 1);
    }

    #[tokio::test]
    async fn test_status_follows_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = workflow(&dir).await;
        let registry = stub_registry();
        for name in ["a", "b", "c"] {
            wf.add_node(NodeSpec::new(NodeKind::read("x.csv")).with_name(name), &registry)
                .await
                .unwrap();
        }

        wf.node_mut("a").unwrap().set_status(NodeStatus::Completed);
        wf.node_mut("b").unwrap().set_status(NodeStatus::Running);
        wf.node_mut("c").unwrap().set_status(NodeStatus::Failed);
        assert_eq!(wf.status(), WorkflowStatus::Running);

        wf.node_mut("b").unwrap().set_status(NodeStatus::Completed);
        assert_eq!(wf.status(), WorkflowStatus::Failed);

        wf.node_mut("c").unwrap().set_status(NodeStatus::Idle);
        assert_eq!(wf.status(), WorkflowStatus::Partial);

        wf.node_mut("c").unwrap().set_status(NodeStatus::Completed);
        assert_eq!(wf.status(), WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_delete_node_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut wf = workflow(&dir).await;
        let registry = stub_registry();
        wf.add_node(NodeSpec::new(NodeKind::read("a.csv")).with_name("a"), &registry)
            .await
            .unwrap();
        let node_dir = wf.node("a").unwrap().dir().to_path_buf();

        wf.delete_node("a").await.unwrap();

        assert!(!node_dir.exists());
        assert!(wf.node("a").is_none());
        assert_eq!(wf.status(), WorkflowStatus::Empty);
        assert!(matches!(
            wf.delete_node("a").await.unwrap_err(),
            WorkflowError::NodeNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_clear_node_requires_folder() {
        let dir = tempfile::tempdir().unwrap();
        let wf = workflow(&dir).await;

        let err = wf.clear_node("missing").await.unwrap_err();
        assert_eq!(err.kind(), tablecore::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remove_deletes_root() {
        let dir = tempfile::tempdir().unwrap();
        let wf = workflow(&dir).await;

        assert!(wf.remove().await.unwrap());
        assert!(!wf.root().exists());
        assert!(!wf.remove().await.unwrap());
    }
}
