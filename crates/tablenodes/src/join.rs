use async_trait::async_trait;
use std::path::PathBuf;
use tablecore::{NodeContext, NodeError, NodeKind, Runnable};
use tableruntime::{NodeFactory, NodeMetadata, ParamDefinition};

/// Join two upstream tables on key columns
pub struct JoinNode {
    left_table: String,
    right_table: String,
    on: Vec<String>,
    how: String,
}

#[async_trait]
impl Runnable for JoinNode {
    fn node_type(&self) -> &str {
        "join"
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PathBuf, NodeError> {
        let left = ctx.load_table(&self.left_table).await?;
        let right = ctx.load_table(&self.right_table).await?;
        ctx.events.info(format!(
            "{} join of '{}' ({} rows) and '{}' ({} rows) on {:?}",
            self.how,
            self.left_table,
            left.height(),
            self.right_table,
            right.height(),
            self.on
        ));

        let on = self.on.clone();
        let how = self.how.clone();
        let table = ctx
            .with_engine(move |engine| engine.join(&left, &right, &on, &how))
            .await?;

        ctx.materialize(&table).await
    }
}

/// Join modes are passed through untouched; the engine rejects unknown ones
/// when the node runs.
pub struct JoinNodeFactory;

impl NodeFactory for JoinNodeFactory {
    fn create(&self, kind: &NodeKind) -> Result<Box<dyn Runnable>, NodeError> {
        let NodeKind::Join {
            left_table,
            right_table,
            on,
            how,
        } = kind
        else {
            return Err(NodeError::Configuration(format!(
                "join factory cannot build a '{}' node",
                kind.type_name()
            )));
        };

        Ok(Box::new(JoinNode {
            left_table: left_table.clone(),
            right_table: right_table.clone(),
            on: on.clone(),
            how: how.clone(),
        }))
    }

    fn node_type(&self) -> &str {
        "join"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Join two tables".to_string(),
            category: "transform".to_string(),
            params: vec![
                ParamDefinition::required("left_table", "Left input table"),
                ParamDefinition::required("right_table", "Right input table"),
                ParamDefinition::required("on", "Key column or list of key columns"),
                ParamDefinition::optional(
                    "how",
                    "inner, left, right, full, semi, anti or cross (default inner)",
                ),
            ],
        }
    }
}
