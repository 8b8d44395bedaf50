// crates/tableruntime/src/loader.rs
use std::path::{Path, PathBuf};
use tablecore::{PipelineDefinition, PipelineError};

/// Reads pipeline definitions (JSON) from a file or a directory of files
pub struct PipelineLoader {
    path: PathBuf,
}

impl PipelineLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load_file(path: &Path) -> Result<PipelineDefinition, PipelineError> {
        let file = std::fs::File::open(path)?;
        let definition = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(definition)
    }

    /// Load every definition; directories are scanned for `*.json`, sorted by file name
    pub fn load_all(&self) -> Result<Vec<PipelineDefinition>, PipelineError> {
        if self.path.is_file() {
            return Ok(vec![Self::load_file(&self.path)?]);
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension() == Some("json".as_ref()) {
                files.push(path);
            }
        }
        files.sort();

        files.iter().map(|p| Self::load_file(p)).collect()
    }
}
