use crate::{EngineError, Table};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options for parsing a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Number of rows inspected when inferring column types.
    pub infer_schema_length: usize,

    /// Replace unparsable cells with null instead of failing the read.
    pub ignore_errors: bool,

    pub delimiter: u8,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            infer_schema_length: 10_000,
            ignore_errors: true,
            delimiter: b',',
        }
    }
}

/// Computes tabular results for nodes.
///
/// The orchestration core never interprets predicates or join modes; their
/// syntax and validation belong entirely to the engine. Methods are
/// synchronous and CPU-bound, so callers run them off the async executor.
pub trait TabularEngine: Send + Sync {
    /// Engine identifier, used in logs
    fn name(&self) -> &str;

    fn read(&self, path: &Path, options: &ReadOptions) -> Result<Table, EngineError>;

    fn filter(&self, table: &Table, predicate: &str) -> Result<Table, EngineError>;

    fn join(
        &self,
        left: &Table,
        right: &Table,
        on: &[String],
        how: &str,
    ) -> Result<Table, EngineError>;

    /// Optional: check a predicate before a node is built around it
    fn validate_predicate(&self, _predicate: &str) -> Result<(), EngineError> {
        Ok(())
    }

    /// Optional: check a join mode and key list without running the join
    fn validate_join(&self, _on: &[String], _how: &str) -> Result<(), EngineError> {
        Ok(())
    }
}
