use crate::Workflow;
use chrono::{DateTime, Utc};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tablecore::{
    ArtifactStore, ErrorKind, EventBus, ExecutionEvent, NodeContext, NodeError, NodeStatus,
    PipelineError, RunId, TabularEngine, WorkflowError, WorkflowStatus,
};

/// Order in which `run_all` visits nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrder {
    /// Exactly the order nodes were added
    #[default]
    Insertion,
    /// Producers before consumers, ties broken by insertion order
    Dependency,
}

impl FromStr for ExecutionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insertion" => Ok(ExecutionOrder::Insertion),
            "dependency" | "topological" => Ok(ExecutionOrder::Dependency),
            other => Err(format!("unknown execution order '{}'", other)),
        }
    }
}

impl std::fmt::Display for ExecutionOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionOrder::Insertion => f.write_str("insertion"),
            ExecutionOrder::Dependency => f.write_str("dependency"),
        }
    }
}

/// Node positions to visit and the policy that produced them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub order: ExecutionOrder,
    pub indices: Vec<usize>,
}

/// A node failure recorded during `run_all`
#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub node: String,
    pub kind: ErrorKind,
    pub error: String,
}

/// Result of a whole-workflow run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub workflow: String,
    pub order: ExecutionOrder,
    pub executed: Vec<String>,
    pub failed_nodes: Vec<String>,
    pub failures: Vec<NodeFailure>,
    pub status: WorkflowStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn failure(&self, node: &str) -> Option<&NodeFailure> {
        self.failures.iter().find(|f| f.node == node)
    }
}

/// Runs workflow nodes one at a time.
///
/// A node failure is recorded and the pass continues with the next node;
/// nothing is retried.
pub struct WorkflowExecutor {
    order: ExecutionOrder,
    engine: Arc<dyn TabularEngine>,
    store: ArtifactStore,
    event_bus: Arc<EventBus>,
    project_root: PathBuf,
}

impl WorkflowExecutor {
    pub fn new(
        order: ExecutionOrder,
        engine: Arc<dyn TabularEngine>,
        store: ArtifactStore,
        event_bus: Arc<EventBus>,
        project_root: PathBuf,
    ) -> Self {
        Self {
            order,
            engine,
            store,
            event_bus,
            project_root,
        }
    }

    pub fn order(&self) -> ExecutionOrder {
        self.order
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Decide the visiting order for `workflow`.
    ///
    /// Dependency order falls back to insertion order when the declared
    /// table references form a cycle.
    pub fn plan(&self, workflow: &Workflow) -> ExecutionPlan {
        let insertion: Vec<usize> = (0..workflow.nodes().len()).collect();

        if self.order == ExecutionOrder::Insertion {
            return ExecutionPlan {
                order: ExecutionOrder::Insertion,
                indices: insertion,
            };
        }

        match dependency_order(workflow) {
            Some(indices) => ExecutionPlan {
                order: ExecutionOrder::Dependency,
                indices,
            },
            None => {
                tracing::warn!(
                    "Workflow '{}' has cyclic table references, falling back to insertion order",
                    workflow.name()
                );
                ExecutionPlan {
                    order: ExecutionOrder::Insertion,
                    indices: insertion,
                }
            }
        }
    }

    /// Run every node once, isolating failures.
    pub async fn run_all(&self, workflow: &mut Workflow) -> RunReport {
        let run_id = RunId::new_v4();
        let start = Instant::now();
        let plan = self.plan(workflow);

        workflow.begin_run();

        let order: Vec<String> = plan
            .indices
            .iter()
            .map(|&i| workflow.nodes()[i].name().to_string())
            .collect();

        tracing::info!(
            "Running workflow '{}': {} nodes in {} order",
            workflow.name(),
            order.len(),
            plan.order
        );
        self.event_bus.emit(ExecutionEvent::WorkflowStarted {
            run_id,
            workflow: workflow.name().to_string(),
            order: order.clone(),
            timestamp: Utc::now(),
        });

        let mut failures = Vec::new();
        for &idx in &plan.indices {
            if let Err(e) = self.execute_node(workflow, idx, run_id).await {
                let node = workflow.nodes()[idx].name().to_string();
                workflow.record_failure(&node);
                failures.push(NodeFailure {
                    node,
                    kind: e.kind(),
                    error: e.to_string(),
                });
            }
        }

        workflow.finish_run();

        let duration_ms = start.elapsed().as_millis() as u64;
        let status = workflow.status();

        if failures.is_empty() {
            tracing::info!("Workflow '{}' completed in {}ms", workflow.name(), duration_ms);
        } else {
            tracing::warn!(
                "Workflow '{}' finished in {}ms with {} failed node(s): {:?}",
                workflow.name(),
                duration_ms,
                failures.len(),
                workflow.failed_nodes()
            );
        }

        self.event_bus.emit(ExecutionEvent::WorkflowCompleted {
            run_id,
            workflow: workflow.name().to_string(),
            status,
            failed_nodes: workflow.failed_nodes().to_vec(),
            duration_ms,
            timestamp: Utc::now(),
        });

        RunReport {
            run_id,
            workflow: workflow.name().to_string(),
            order: plan.order,
            executed: order,
            failed_nodes: workflow.failed_nodes().to_vec(),
            failures,
            status,
            last_run_at: workflow.last_run_at(),
            completed_at: workflow.completed_at(),
            duration_ms,
        }
    }

    /// Run a single node. Its error is returned to the caller as is and
    /// the workflow's failure bookkeeping is not touched.
    pub async fn run_node(
        &self,
        workflow: &mut Workflow,
        name: &str,
    ) -> Result<PathBuf, PipelineError> {
        let idx = workflow
            .position(name)
            .ok_or_else(|| WorkflowError::NodeNotFound(name.to_string()))?;

        Ok(self.execute_node(workflow, idx, RunId::new_v4()).await?)
    }

    async fn execute_node(
        &self,
        workflow: &mut Workflow,
        idx: usize,
        run_id: RunId,
    ) -> Result<PathBuf, NodeError> {
        let workflow_name = workflow.name().to_string();
        let workflow_root = workflow.root().to_path_buf();
        let node = &mut workflow.nodes_mut()[idx];

        let ctx = NodeContext {
            node_id: node.id(),
            node_name: node.name().to_string(),
            table_name: node.table_name().to_string(),
            node_dir: node.dir().to_path_buf(),
            workflow_root,
            project_root: self.project_root.clone(),
            engine: Arc::clone(&self.engine),
            store: self.store.clone(),
            events: self
                .event_bus
                .create_emitter(run_id, workflow_name.clone(), node.name()),
        };

        self.event_bus.emit(ExecutionEvent::NodeStarted {
            run_id,
            workflow: workflow_name.clone(),
            node: node.name().to_string(),
            node_type: node.node_type().to_string(),
            timestamp: Utc::now(),
        });
        tracing::debug!("Starting node '{}' ({})", node.name(), node.node_type());

        let start = Instant::now();
        let result = node.run(&ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(path) => {
                tracing::info!(
                    "Node '{}' completed in {}ms -> {}",
                    node.name(),
                    duration_ms,
                    path.display()
                );
            }
            Err(e) => {
                tracing::error!("Node '{}' failed: {}", node.name(), e);
            }
        }

        self.event_bus.emit(ExecutionEvent::NodeFinished {
            run_id,
            workflow: workflow_name,
            node: node.name().to_string(),
            status: node.status(),
            artifact: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(ToString::to_string),
            duration_ms,
            timestamp: Utc::now(),
        });

        debug_assert!(matches!(
            node.status(),
            NodeStatus::Completed | NodeStatus::Failed
        ));
        result
    }
}

/// Stable topological order over declared table references.
///
/// A reference resolves to the node whose directory carries that name,
/// mirroring artifact resolution. Returns `None` on a cycle.
fn dependency_order(workflow: &Workflow) -> Option<Vec<usize>> {
    let nodes = workflow.nodes();
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();

    let producers: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.name(), i))
        .collect();

    for (consumer, node) in nodes.iter().enumerate() {
        for table in node.kind().references() {
            if let Some(&producer) = producers.get(table) {
                graph.add_edge(indices[producer], indices[consumer], ());
            }
        }
    }

    if is_cyclic_directed(&graph) {
        return None;
    }

    let mut in_degree: Vec<usize> = indices
        .iter()
        .map(|&idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for next in graph.neighbors_directed(indices[i], Direction::Outgoing) {
            let j = graph[next];
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.push(Reverse(j));
            }
        }
    }

    Some(order)
}
