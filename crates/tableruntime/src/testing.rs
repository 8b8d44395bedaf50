//! Stub nodes for exercising orchestration without a real engine.

use crate::{NodeFactory, NodeRegistry};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tablecore::{
    Cell, Column, DataType, EngineError, NodeContext, NodeError, NodeKind, ReadOptions,
    Runnable, Table, TabularEngine,
};

/// Engine that refuses every operation.
pub(crate) struct NullEngine;

impl TabularEngine for NullEngine {
    fn name(&self) -> &str {
        "null"
    }

    fn read(&self, path: &Path, _options: &ReadOptions) -> Result<Table, EngineError> {
        Err(EngineError::Source {
            path: path.to_path_buf(),
            message: "null engine".to_string(),
        })
    }

    fn filter(&self, _table: &Table, predicate: &str) -> Result<Table, EngineError> {
        Err(EngineError::InvalidPredicate(predicate.to_string()))
    }

    fn join(
        &self,
        _left: &Table,
        _right: &Table,
        _on: &[String],
        how: &str,
    ) -> Result<Table, EngineError> {
        Err(EngineError::UnsupportedJoin(how.to_string()))
    }
}

/// Sources named `fail*.csv` fail; any other source yields one row holding
/// the file name. Nodes with references concatenate their inputs.
struct StubNode {
    kind: NodeKind,
}

#[async_trait]
impl Runnable for StubNode {
    fn node_type(&self) -> &str {
        self.kind.type_name()
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PathBuf, NodeError> {
        let table = match &self.kind {
            NodeKind::Read { file_path, .. } => {
                let file = file_path.to_string_lossy().to_string();
                if file.starts_with("fail") {
                    return Err(EngineError::Source {
                        path: file_path.clone(),
                        message: "stub failure".to_string(),
                    }
                    .into());
                }
                Table::new(vec![Column::new(
                    "source",
                    DataType::Str,
                    vec![Cell::Str(file)],
                )])
            }
            other => {
                let mut values = Vec::new();
                for table in other.references() {
                    let upstream = ctx.load_table(table).await?;
                    if let Some(col) = upstream.column("source") {
                        values.extend(col.values.iter().cloned());
                    }
                }
                Table::new(vec![Column::new("source", DataType::Str, values)])
            }
        };
        ctx.materialize(&table).await
    }
}

struct StubFactory(&'static str);

impl NodeFactory for StubFactory {
    fn create(&self, kind: &NodeKind) -> Result<Box<dyn Runnable>, NodeError> {
        Ok(Box::new(StubNode { kind: kind.clone() }))
    }

    fn node_type(&self) -> &str {
        self.0
    }
}

pub(crate) fn stub_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    for kind in ["read", "join", "filter"] {
        registry.register(Arc::new(StubFactory(kind)));
    }
    registry
}
