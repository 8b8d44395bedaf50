use crate::executor::{ExecutionOrder, RunReport, WorkflowExecutor};
use crate::node::NodeInfo;
use crate::registry::NodeRegistry;
use crate::workflow::{WorkflowExport, WorkflowSummary};
use crate::workflows::{SharedWorkflow, WorkflowRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tablecore::{
    ArtifactStore, EventBus, ExecutionEvent, NodeKind, NodeSpec, PipelineDefinition,
    PipelineError, Table, TabularEngine, WorkflowError,
};
use thiserror::Error;

/// Main runtime: owns the workflow registry and runs pipelines
pub struct PipelineRuntime {
    config: RuntimeConfig,
    registry: Arc<NodeRegistry>,
    workflows: WorkflowRegistry,
    executor: WorkflowExecutor,
    event_bus: Arc<EventBus>,
    engine: Arc<dyn TabularEngine>,
}

impl PipelineRuntime {
    /// Create a runtime with a pre-configured node registry and engine
    pub fn with_registry(
        registry: Arc<NodeRegistry>,
        engine: Arc<dyn TabularEngine>,
        config: RuntimeConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let store = ArtifactStore::new(config.compression_level);
        let executor = WorkflowExecutor::new(
            config.execution_order,
            Arc::clone(&engine),
            store,
            Arc::clone(&event_bus),
            config.project_root.clone(),
        );

        tracing::info!(
            "Runtime ready: engine={}, data_dir={}, order={}",
            engine.name(),
            config.data_dir.display(),
            config.execution_order
        );

        Self {
            workflows: WorkflowRegistry::new(config.data_dir.clone()),
            config,
            registry,
            executor,
            event_bus,
            engine,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get access to the node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    pub fn engine(&self) -> &Arc<dyn TabularEngine> {
        &self.engine
    }

    /// Subscribe to execution and audit events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub async fn workflow(&self, name: &str) -> Result<SharedWorkflow, WorkflowError> {
        self.workflows.get(name).await
    }

    pub async fn create_workflow(&self, name: &str) -> Result<WorkflowSummary, PipelineError> {
        let shared = self.workflows.create(name).await?;
        let summary = shared.lock().await.summary();

        self.event_bus.record_action(
            Some(name),
            "create_workflow",
            serde_json::json!({ "name": name }),
        );
        Ok(summary)
    }

    pub async fn delete_workflow(&self, name: &str) -> Result<(), PipelineError> {
        self.workflows.delete(name).await?;
        self.event_bus
            .record_action(Some(name), "delete_workflow", serde_json::Value::Null);
        Ok(())
    }

    pub async fn list_workflows(&self) -> Vec<WorkflowSummary> {
        let mut summaries = Vec::new();
        for shared in self.workflows.list().await {
            summaries.push(shared.lock().await.summary());
        }
        summaries
    }

    /// Add a node to a workflow. Filter predicates are checked by the
    /// engine here; referenced tables are not.
    pub async fn add_node(&self, workflow: &str, spec: NodeSpec) -> Result<NodeInfo, PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        if let NodeKind::Filter { filter_expr, .. } = &spec.kind {
            self.engine
                .validate_predicate(filter_expr)
                .map_err(|e| WorkflowError::Invalid(e.to_string()))?;
        }

        let mut wf = shared.lock().await;
        let info = wf.add_node(spec.clone(), &self.registry).await?.info();

        self.event_bus.record_action(
            Some(workflow),
            format!("add_{}_node", info.node_type),
            serde_json::to_value(&spec)?,
        );
        Ok(info)
    }

    pub async fn list_nodes(&self, workflow: &str) -> Result<Vec<NodeInfo>, PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        let wf = shared.lock().await;
        Ok(wf.nodes().iter().map(|n| n.info()).collect())
    }

    pub async fn delete_node(&self, workflow: &str, node: &str) -> Result<(), PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        shared.lock().await.delete_node(node).await?;

        self.event_bus.record_action(
            Some(workflow),
            "delete_node",
            serde_json::json!({ "node": node }),
        );
        Ok(())
    }

    /// Empty a node folder; returns the number of files removed
    pub async fn clear_node(&self, workflow: &str, node: &str) -> Result<usize, PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        let removed = shared.lock().await.clear_node(node).await?;

        self.event_bus.record_action(
            Some(workflow),
            "clear_node",
            serde_json::json!({ "node": node, "removed": removed }),
        );
        Ok(removed)
    }

    pub async fn run_workflow(&self, workflow: &str) -> Result<RunReport, PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        let mut wf = shared.lock().await;
        let report = self.executor.run_all(&mut wf).await;

        self.event_bus.record_action(
            Some(workflow),
            "run_workflow",
            serde_json::json!({
                "run_id": report.run_id,
                "failed_nodes": report.failed_nodes,
            }),
        );
        Ok(report)
    }

    /// Run one node; its failure is returned to the caller
    pub async fn run_node(&self, workflow: &str, node: &str) -> Result<NodeInfo, PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        let mut wf = shared.lock().await;
        let result = self.executor.run_node(&mut wf, node).await;

        self.event_bus.record_action(
            Some(workflow),
            "run_node",
            serde_json::json!({ "node": node, "ok": result.is_ok() }),
        );

        result?;
        let info = wf
            .node(node)
            .map(|n| n.info())
            .ok_or_else(|| WorkflowError::NodeNotFound(node.to_string()))?;
        Ok(info)
    }

    /// First `limit` rows of a node's last successful output
    pub async fn preview(
        &self,
        workflow: &str,
        node: &str,
        limit: usize,
    ) -> Result<Table, PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        let output = {
            let wf = shared.lock().await;
            let node_ref = wf
                .node(node)
                .ok_or_else(|| WorkflowError::NodeNotFound(node.to_string()))?;
            node_ref
                .output()
                .map(PathBuf::from)
                .ok_or_else(|| WorkflowError::NoOutput(node.to_string()))?
        };

        let table = self.executor.store().load(&output).await?;
        Ok(table.head(limit))
    }

    pub async fn export(&self, workflow: &str) -> Result<WorkflowExport, PipelineError> {
        let shared = self.workflows.get(workflow).await?;
        let export = shared.lock().await.export();
        Ok(export)
    }

    /// Register a workflow described by a pipeline definition.
    ///
    /// On a bad node the partially built workflow is deleted again.
    pub async fn load_pipeline(
        &self,
        definition: &PipelineDefinition,
    ) -> Result<WorkflowSummary, PipelineError> {
        self.create_workflow(&definition.name).await?;

        for spec in &definition.nodes {
            if let Err(e) = self.add_node(&definition.name, spec.clone()).await {
                tracing::error!("Pipeline '{}' rejected: {}", definition.name, e);
                self.workflows.delete(&definition.name).await?;
                return Err(e);
            }
        }

        let shared = self.workflows.get(&definition.name).await?;
        let summary = shared.lock().await.summary();
        Ok(summary)
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory holding one artifact root per workflow
    pub data_dir: PathBuf,
    /// Base for relative read-node source paths
    pub project_root: PathBuf,
    pub execution_order: ExecutionOrder,
    pub event_buffer_size: usize,
    /// zstd level for artifact files
    pub compression_level: i32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            project_root: PathBuf::from("."),
            execution_order: ExecutionOrder::Insertion,
            event_buffer_size: 1000,
            compression_level: 3,
        }
    }
}

#[derive(Error, Debug)]
#[error("Invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

impl RuntimeConfig {
    pub const DATA_DIR_VAR: &'static str = "TABLEFLOW_DATA_DIR";
    pub const PROJECT_ROOT_VAR: &'static str = "TABLEFLOW_PROJECT_ROOT";
    pub const EXECUTION_ORDER_VAR: &'static str = "TABLEFLOW_EXECUTION_ORDER";
    pub const COMPRESSION_LEVEL_VAR: &'static str = "TABLEFLOW_COMPRESSION_LEVEL";

    /// Defaults overridden by `TABLEFLOW_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup(Self::DATA_DIR_VAR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(root) = lookup(Self::PROJECT_ROOT_VAR) {
            config.project_root = PathBuf::from(root);
        }
        if let Some(order) = lookup(Self::EXECUTION_ORDER_VAR) {
            config.execution_order = order.parse().map_err(|reason| ConfigError {
                key: Self::EXECUTION_ORDER_VAR.to_string(),
                value: order.clone(),
                reason,
            })?;
        }
        if let Some(level) = lookup(Self::COMPRESSION_LEVEL_VAR) {
            config.compression_level = level.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError {
                    key: Self::COMPRESSION_LEVEL_VAR.to_string(),
                    value: level.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_execution_order(mut self, order: ExecutionOrder) -> Self {
        self.execution_order = order;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stub_registry, NullEngine};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use tablecore::{ErrorKind, NodeKind, WorkflowStatus};

    fn runtime(dir: &tempfile::TempDir) -> PipelineRuntime {
        PipelineRuntime::with_registry(
            Arc::new(stub_registry()),
            Arc::new(NullEngine),
            RuntimeConfig::default()
                .with_data_dir(dir.path().join("data"))
                .with_project_root(dir.path()),
        )
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (RuntimeConfig::DATA_DIR_VAR, "/srv/data"),
            (RuntimeConfig::EXECUTION_ORDER_VAR, "Dependency"),
            (RuntimeConfig::COMPRESSION_LEVEL_VAR, "9"),
        ]
        .into_iter()
        .collect();

        let config =
            RuntimeConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.project_root, PathBuf::from("."));
        assert_eq!(config.execution_order, ExecutionOrder::Dependency);
        assert_eq!(config.compression_level, 9);

        let err = RuntimeConfig::from_lookup(|k| {
            (k == RuntimeConfig::EXECUTION_ORDER_VAR).then(|| "random".to_string())
        })
        .unwrap_err();
        assert_eq!(err.key, RuntimeConfig::EXECUTION_ORDER_VAR);
    }

    #[tokio::test]
    async fn test_mutations_are_audited() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let mut events = rt.subscribe_events();

        rt.create_workflow("w").await.unwrap();
        rt.add_node("w", NodeSpec::new(NodeKind::read("a.csv")).with_name("a"))
            .await
            .unwrap();
        rt.delete_node("w", "a").await.unwrap();

        let mut actions = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ExecutionEvent::Action { action, .. } = event {
                actions.push(action);
            }
        }
        assert_eq!(actions, vec!["create_workflow", "add_read_node", "delete_node"]);
    }

    #[tokio::test]
    async fn test_preview_requires_output() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        rt.create_workflow("w").await.unwrap();
        rt.add_node("w", NodeSpec::new(NodeKind::read("a.csv")).with_name("a"))
            .await
            .unwrap();

        let err = rt.preview("w", "a", 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        rt.run_node("w", "a").await.unwrap();
        let table = rt.preview("w", "a", 5).await.unwrap();
        assert_eq!(table.height(), 1);
    }

    #[tokio::test]
    async fn test_run_workflow_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        rt.create_workflow("w").await.unwrap();
        rt.add_node("w", NodeSpec::new(NodeKind::read("a.csv")).with_name("a"))
            .await
            .unwrap();
        rt.add_node("w", NodeSpec::new(NodeKind::read("fail.csv")).with_name("b"))
            .await
            .unwrap();

        let report = rt.run_workflow("w").await.unwrap();
        assert_eq!(report.failed_nodes, vec!["b"]);

        let export = rt.export("w").await.unwrap();
        assert_eq!(export.status, WorkflowStatus::Failed);
        assert_eq!(export.failed_nodes, vec!["b"]);
        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.nodes[0].node_type, "read");

        let summaries = rt.list_workflows().await;
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].last_run_at.is_some());
        assert!(summaries[0].completed_at.is_none());
    }

    #[tokio::test]
    async fn test_load_pipeline_rolls_back_on_bad_node() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime(&dir);
        let definition = PipelineDefinition::new("p")
            .with_node(NodeSpec::new(NodeKind::read("a.csv")).with_name("a"))
            .with_node(NodeSpec::new(NodeKind::read("b.csv")).with_name("a"));

        let err = rt.load_pipeline(&definition).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(rt.workflow("p").await.is_err());
        assert!(!dir.path().join("data/p").exists());
    }
}
