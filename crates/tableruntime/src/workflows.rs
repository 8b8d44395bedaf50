use crate::Workflow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tablecore::{validate_name, ArtifactStore, WorkflowError};
use tokio::sync::{Mutex, RwLock};

/// A registered workflow.
///
/// The mutex is the per-workflow run lock: runs, node deletion and folder
/// clearing all hold it, so at most one of them touches the workflow's
/// artifact tree at a time.
pub type SharedWorkflow = Arc<Mutex<Workflow>>;

/// Mapping from workflow name to workflow, with artifact roots under
/// `data_dir/<name>`.
pub struct WorkflowRegistry {
    data_dir: PathBuf,
    workflows: RwLock<BTreeMap<String, SharedWorkflow>>,
}

impl WorkflowRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            workflows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Artifact root for a workflow called `name`
    pub fn root_for(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Register a new, empty workflow. Its artifact root is recreated empty.
    pub async fn create(&self, name: &str) -> Result<SharedWorkflow, WorkflowError> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(name) {
            return Err(WorkflowError::AlreadyExists(name.to_string()));
        }

        let workflow = Workflow::create(name, self.root_for(name)).await?;
        tracing::info!("Created workflow '{}' ({})", name, workflow.id());

        let shared = Arc::new(Mutex::new(workflow));
        workflows.insert(name.to_string(), Arc::clone(&shared));
        Ok(shared)
    }

    pub async fn get(&self, name: &str) -> Result<SharedWorkflow, WorkflowError> {
        self.workflows
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))
    }

    /// All workflows, ordered by name
    pub async fn list(&self) -> Vec<SharedWorkflow> {
        self.workflows.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.workflows.read().await.contains_key(name)
    }

    /// Drop the registry entry and the on-disk root.
    ///
    /// Succeeds when either existed; `NotFound` only when neither did.
    pub async fn delete(&self, name: &str) -> Result<(), WorkflowError> {
        validate_name(name)?;

        let removed = self.workflows.write().await.remove(name);

        let deleted_disk = match &removed {
            Some(shared) => {
                // Wait for any in-flight run before pulling the tree away.
                let workflow = shared.lock().await;
                workflow.remove().await?
            }
            None => ArtifactStore::delete(&self.root_for(name)).await?,
        };

        if removed.is_none() && !deleted_disk {
            return Err(WorkflowError::NotFound(name.to_string()));
        }

        tracing::info!(
            "Deleted workflow '{}' (registered: {}, on disk: {})",
            name,
            removed.is_some(),
            deleted_disk
        );
        Ok(())
    }
}
