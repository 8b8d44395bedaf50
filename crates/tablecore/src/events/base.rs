use crate::{NodeStatus, WorkflowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// Events emitted while building and running pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        run_id: RunId,
        workflow: String,
        order: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        run_id: RunId,
        workflow: String,
        status: WorkflowStatus,
        failed_nodes: Vec<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeStarted {
        run_id: RunId,
        workflow: String,
        node: String,
        node_type: String,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        run_id: RunId,
        workflow: String,
        node: String,
        status: NodeStatus,
        artifact: Option<PathBuf>,
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        run_id: RunId,
        workflow: String,
        node: String,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
    /// A mutating action, recorded by audit subscribers
    Action {
        workflow: Option<String>,
        action: String,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

/// Events specific to node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter for nodes to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    run_id: RunId,
    workflow: String,
    node: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        run_id: RunId,
        workflow: impl Into<String>,
        node: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            run_id,
            workflow: workflow.into(),
            node: node.into(),
            sender,
        }
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            run_id: self.run_id,
            workflow: self.workflow.clone(),
            node: self.node.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }
}

/// Process-wide event bus.
///
/// Sending never blocks and never fails the caller: with no subscribers
/// the event is dropped, and slow subscribers observe `Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    /// Fire-and-forget audit record
    pub fn record_action(
        &self,
        workflow: Option<&str>,
        action: impl Into<String>,
        payload: serde_json::Value,
    ) {
        self.emit(ExecutionEvent::Action {
            workflow: workflow.map(str::to_string),
            action: action.into(),
            payload,
            timestamp: Utc::now(),
        });
    }

    pub fn create_emitter(
        &self,
        run_id: RunId,
        workflow: impl Into<String>,
        node: impl Into<String>,
    ) -> EventEmitter {
        EventEmitter::new(run_id, workflow, node, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
