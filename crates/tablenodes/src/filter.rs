use async_trait::async_trait;
use std::path::PathBuf;
use tablecore::{NodeContext, NodeError, NodeKind, Runnable};
use tableruntime::{NodeFactory, NodeMetadata, ParamDefinition};

/// Keep the rows of an upstream table that match a predicate
pub struct FilterNode {
    input_table: String,
    filter_expr: String,
}

#[async_trait]
impl Runnable for FilterNode {
    fn node_type(&self) -> &str {
        "filter"
    }

    async fn run(&self, ctx: &NodeContext) -> Result<PathBuf, NodeError> {
        let input = ctx.load_table(&self.input_table).await?;
        let before = input.height();

        let predicate = self.filter_expr.clone();
        let table = ctx
            .with_engine(move |engine| engine.filter(&input, &predicate))
            .await?;

        ctx.events.info(format!(
            "kept {} of {} rows from '{}'",
            table.height(),
            before,
            self.input_table
        ));
        ctx.materialize(&table).await
    }
}

pub struct FilterNodeFactory;

impl NodeFactory for FilterNodeFactory {
    fn create(&self, kind: &NodeKind) -> Result<Box<dyn Runnable>, NodeError> {
        match kind {
            NodeKind::Filter {
                input_table,
                filter_expr,
                ..
            } => Ok(Box::new(FilterNode {
                input_table: input_table.clone(),
                filter_expr: filter_expr.clone(),
            })),
            other => Err(NodeError::Configuration(format!(
                "filter factory cannot build a '{}' node",
                other.type_name()
            ))),
        }
    }

    fn node_type(&self) -> &str {
        "filter"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Filter rows with a predicate".to_string(),
            category: "transform".to_string(),
            params: vec![
                ParamDefinition::required("input_table", "Input table"),
                ParamDefinition::required("filter_expr", "Predicate, e.g. col(\"Qty\") > 10"),
                ParamDefinition::optional("table_name", "Output table name (defaults to the node name)"),
            ],
        }
    }
}
