//! In-process tabular engine

mod join;
mod predicate;
mod reader;

pub use join::{JoinType, RIGHT_SUFFIX};
pub use predicate::Predicate;

use std::path::Path;
use tablecore::{EngineError, ReadOptions, Table, TabularEngine};

/// Engine backed by plain in-memory tables: CSV via the `csv` crate,
/// a small predicate language for filters and hash joins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEngine;

impl TabularEngine for LocalEngine {
    fn name(&self) -> &str {
        "local"
    }

    fn read(&self, path: &Path, options: &ReadOptions) -> Result<Table, EngineError> {
        reader::read_csv(path, options)
    }

    fn filter(&self, table: &Table, predicate: &str) -> Result<Table, EngineError> {
        Predicate::parse(predicate)?.filter(table)
    }

    fn join(
        &self,
        left: &Table,
        right: &Table,
        on: &[String],
        how: &str,
    ) -> Result<Table, EngineError> {
        join::join(left, right, on, how.parse()?)
    }

    fn validate_predicate(&self, predicate: &str) -> Result<(), EngineError> {
        Predicate::parse(predicate).map(|_| ())
    }

    fn validate_join(&self, on: &[String], how: &str) -> Result<(), EngineError> {
        let mode: JoinType = how.parse()?;
        if mode.requires_keys() && on.is_empty() {
            return Err(EngineError::UnsupportedJoin(format!("{} join without keys", how)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_join() {
        let engine = LocalEngine;
        let keys = vec!["id".to_string()];
        assert!(engine.validate_join(&keys, "LEFT").is_ok());
        assert!(engine.validate_join(&[], "cross").is_ok());
        assert!(matches!(
            engine.validate_join(&keys, "asof"),
            Err(EngineError::UnsupportedJoin(_))
        ));
        assert!(engine.validate_join(&[], "inner").is_err());
    }
}
