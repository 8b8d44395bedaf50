//! On-disk artifact namespace.
//!
//! Every node owns `<workflow_root>/<node_name>/` and writes its result to
//! `<table_name>.parquet` inside it. Downstream nodes locate a table by
//! looking for `<workflow_root>/<table>/<table>.parquet`, so a table is only
//! discoverable when its name matches the producing node's directory.

use crate::{ArtifactError, Cell, Column, DataType, Table};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const ARTIFACT_EXTENSION: &str = "parquet";

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ArtifactFile {
    format_version: u32,
    columns: Vec<StoredColumn>,
}

#[derive(Serialize, Deserialize)]
struct StoredColumn {
    name: String,
    dtype: DataType,
    values: Vec<StoredCell>,
}

/// JSON has no NaN or infinity, so non-finite floats are written as
/// `{"float": "NaN"}` instead of collapsing to null.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredCell {
    Plain(Cell),
    NonFinite { float: String },
}

impl From<&Cell> for StoredCell {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Float(n) if !n.is_finite() => StoredCell::NonFinite {
                float: n.to_string(),
            },
            other => StoredCell::Plain(other.clone()),
        }
    }
}

impl StoredCell {
    fn into_cell(self) -> Result<Cell, String> {
        match self {
            StoredCell::Plain(cell) => Ok(cell),
            StoredCell::NonFinite { float } => float
                .parse::<f64>()
                .map(Cell::Float)
                .map_err(|_| format!("invalid float '{}'", float)),
        }
    }
}

/// Reads and writes materialized tables.
///
/// The container is a zstd-compressed columnar JSON document. Encoding is
/// deterministic, so equal tables always produce byte-identical files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    compression_level: i32,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ArtifactStore {
    pub fn new(compression_level: i32) -> Self {
        Self { compression_level }
    }

    /// Path where the table named `table_name` is expected to live.
    ///
    /// Pure composition: the file may not exist.
    pub fn resolve(workflow_root: &Path, table_name: &str) -> PathBuf {
        Self::artifact_path(&workflow_root.join(table_name), table_name)
    }

    pub fn artifact_path(node_dir: &Path, table_name: &str) -> PathBuf {
        node_dir.join(format!("{table_name}.{ARTIFACT_EXTENSION}"))
    }

    /// Write `table` under `node_dir`, replacing any previous artifact.
    pub async fn materialize(
        &self,
        node_dir: &Path,
        table_name: &str,
        table: &Table,
    ) -> Result<PathBuf, ArtifactError> {
        let path = Self::artifact_path(node_dir, table_name);
        let bytes = self.encode(&path, table)?;

        tokio::fs::create_dir_all(node_dir).await?;
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(
            "Materialized {} rows x {} cols to {}",
            table.height(),
            table.width(),
            path.display()
        );
        Ok(path)
    }

    pub async fn load(&self, path: &Path) -> Result<Table, ArtifactError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtifactError::Missing(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        Self::decode(path, &bytes)
    }

    /// Remove every file in `node_dir`, keeping the directory.
    pub async fn clear(node_dir: &Path) -> Result<usize, ArtifactError> {
        let mut entries = match tokio::fs::read_dir(node_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtifactError::DirectoryNotFound(node_dir.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Recursively remove `dir`. Returns false if it was already absent.
    pub async fn delete(dir: &Path) -> Result<bool, ArtifactError> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn encode(&self, path: &Path, table: &Table) -> Result<Vec<u8>, ArtifactError> {
        let file = ArtifactFile {
            format_version: FORMAT_VERSION,
            columns: table
                .columns
                .iter()
                .map(|c| StoredColumn {
                    name: c.name.clone(),
                    dtype: c.dtype,
                    values: c.values.iter().map(StoredCell::from).collect(),
                })
                .collect(),
        };
        let json = serde_json::to_vec(&file).map_err(|e| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(zstd::encode_all(json.as_slice(), self.compression_level)?)
    }

    fn decode(path: &Path, bytes: &[u8]) -> Result<Table, ArtifactError> {
        let corrupt = |message: String| ArtifactError::Corrupt {
            path: path.to_path_buf(),
            message,
        };

        let json = zstd::decode_all(bytes).map_err(|e| corrupt(e.to_string()))?;
        let file: ArtifactFile =
            serde_json::from_slice(&json).map_err(|e| corrupt(e.to_string()))?;

        if file.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {}",
                file.format_version
            )));
        }

        let columns = file
            .columns
            .into_iter()
            .map(|c| {
                let values = c
                    .values
                    .into_iter()
                    .map(StoredCell::into_cell)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(&corrupt)?;
                Ok(Column::new(c.name, c.dtype, values))
            })
            .collect::<Result<Vec<_>, ArtifactError>>()?;
        Ok(Table::new(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> Table {
        Table::new(vec![Column::new(
            "qty",
            DataType::Int,
            vec![Cell::Int(4), Cell::Null, Cell::Int(9)],
        )])
    }

    #[test]
    fn test_resolve_is_sibling_directory() {
        let path = ArtifactStore::resolve(Path::new("/data/wf"), "sales");
        assert_eq!(path, PathBuf::from("/data/wf/sales/sales.parquet"));
    }

    #[tokio::test]
    async fn test_materialize_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::default();
        let node_dir = dir.path().join("qty");

        let path = store.materialize(&node_dir, "qty", &table()).await.unwrap();
        assert_eq!(path, ArtifactStore::resolve(dir.path(), "qty"));

        let loaded = store.load(&path).await.unwrap();
        assert_eq!(loaded, table());
    }

    #[tokio::test]
    async fn test_non_finite_floats_survive() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::default();
        let table = Table::new(vec![
            Column::new(
                "v",
                DataType::Float,
                vec![
                    Cell::Float(f64::NAN),
                    Cell::Float(f64::INFINITY),
                    Cell::Float(f64::NEG_INFINITY),
                    Cell::Float(1.5),
                    Cell::Null,
                ],
            ),
            Column::new(
                "label",
                DataType::Str,
                vec![
                    Cell::from("NaN"),
                    Cell::from("inf"),
                    Cell::from("-inf"),
                    Cell::from("1.5"),
                    Cell::from("null"),
                ],
            ),
        ]);

        let path = store.materialize(dir.path(), "t", &table).await.unwrap();
        let loaded = store.load(&path).await.unwrap();

        let v = &loaded.column("v").unwrap().values;
        assert!(matches!(v[0], Cell::Float(n) if n.is_nan()));
        assert_eq!(v[1..], table.columns[0].values[1..]);
        assert_eq!(loaded.columns[1], table.columns[1]);
    }

    #[tokio::test]
    async fn test_encoding_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::default();

        let path = store.materialize(dir.path(), "t", &table()).await.unwrap();
        let first = tokio::fs::read(&path).await.unwrap();
        store.materialize(dir.path(), "t", &table()).await.unwrap();
        let second = tokio::fs::read(&path).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::default();

        let err = store
            .load(&ArtifactStore::resolve(dir.path(), "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Missing(_)));
    }

    #[tokio::test]
    async fn test_clear_keeps_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::default();
        let node_dir = dir.path().join("n");
        store.materialize(&node_dir, "n", &table()).await.unwrap();
        store.materialize(&node_dir, "other", &table()).await.unwrap();

        let removed = ArtifactStore::clear(&node_dir).await.unwrap();
        assert_eq!(removed, 2);
        assert!(node_dir.is_dir());
        assert_eq!(std::fs::read_dir(&node_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_clear_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactStore::clear(&dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::DirectoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let node_dir = dir.path().join("n");
        ArtifactStore::default()
            .materialize(&node_dir, "n", &table())
            .await
            .unwrap();

        assert!(ArtifactStore::delete(&node_dir).await.unwrap());
        assert!(!node_dir.exists());
        assert!(!ArtifactStore::delete(&node_dir).await.unwrap());
    }
}
