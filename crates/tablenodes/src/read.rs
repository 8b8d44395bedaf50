use async_trait::async_trait;
use std::path::PathBuf;
use tablecore::{NodeContext, NodeError, NodeKind, ReadOptions, Runnable};
use tableruntime::{NodeFactory, NodeMetadata, ParamDefinition};

/// Load a CSV source and materialize it as a table
pub struct ReadNode {
    file_path: PathBuf,
    options: ReadOptions,
}

impl ReadNode {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            options: ReadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl Runnable for ReadNode {
    fn node_type(&self) -> &str {
        "read"
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PathBuf, NodeError> {
        let source = ctx.source_path(&self.file_path);
        ctx.events.info(format!("reading {}", source.display()));

        let options = self.options.clone();
        let table = ctx
            .with_engine(move |engine| engine.read(&source, &options))
            .await?;

        ctx.materialize(&table).await
    }
}

pub struct ReadNodeFactory;

impl NodeFactory for ReadNodeFactory {
    fn create(&self, kind: &NodeKind) -> Result<Box<dyn Runnable>, NodeError> {
        match kind {
            NodeKind::Read { file_path, .. } => Ok(Box::new(ReadNode::new(file_path.clone()))),
            other => Err(NodeError::Configuration(format!(
                "read factory cannot build a '{}' node",
                other.type_name()
            ))),
        }
    }

    fn node_type(&self) -> &str {
        "read"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Read a CSV file into a table".to_string(),
            category: "source".to_string(),
            params: vec![
                ParamDefinition::required("file_path", "CSV path, relative to the project root"),
                ParamDefinition::optional("table_name", "Output table name (defaults to the node name)"),
            ],
        }
    }
}
