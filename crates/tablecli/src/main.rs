// crates/tablecli/src/main.rs

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tablecore::{
    validate_name, ExecutionEvent, NodeEvent, NodeKind, NodeSpec, NodeStatus, PipelineDefinition,
    TabularEngine,
};
use tablenodes::LocalEngine;
use tableruntime::{NodeRegistry, PipelineLoader, PipelineRuntime, RuntimeConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tableflow")]
#[command(about = "Tabular pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every node of a pipeline file
    Run {
        /// Path to pipeline JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Artifact directory (overrides TABLEFLOW_DATA_DIR)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Check a pipeline file without running it
    Validate {
        /// Path to pipeline JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create an example pipeline with sample data
    Init {
        /// Output file path
        #[arg(short, long, default_value = "pipeline.json")]
        output: PathBuf,
    },

    /// Run a pipeline and print the first rows of one node's output
    Preview {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        node: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            data_dir,
            verbose,
        } => {
            init_tracing(verbose);
            run_pipeline(file, data_dir).await?;
        }

        Commands::Validate { file } => {
            init_tracing(false);
            validate_pipeline(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_pipeline(output)?;
        }

        Commands::Preview {
            file,
            node,
            limit,
            data_dir,
        } => {
            init_tracing(false);
            preview_node(file, node, limit, data_dir).await?;
        }
    }

    Ok(())
}

fn standard_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    tablenodes::register_all(&mut registry);
    registry
}

/// Relative sources resolve against the pipeline file's directory unless
/// TABLEFLOW_PROJECT_ROOT says otherwise.
fn runtime_for(file: &Path, data_dir: Option<PathBuf>) -> Result<PipelineRuntime> {
    let mut config = RuntimeConfig::from_env()?;
    if std::env::var_os(RuntimeConfig::PROJECT_ROOT_VAR).is_none() {
        if let Some(parent) = file.parent() {
            config.project_root = parent.to_path_buf();
        }
    }
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    tracing::debug!(
        "Artifacts under {}, sources under {}",
        config.data_dir.display(),
        config.project_root.display()
    );
    Ok(tablenodes::standard_runtime(config))
}

async fn load(
    file: &Path,
    data_dir: Option<PathBuf>,
) -> Result<(PipelineRuntime, PipelineDefinition)> {
    println!("Loading pipeline from: {}", file.display());
    let definition = PipelineLoader::load_file(file)?;
    let runtime = runtime_for(file, data_dir)?;
    runtime.load_pipeline(&definition).await?;

    println!("Pipeline: {}", definition.name);
    if let Some(description) = &definition.description {
        println!("   {}", description);
    }
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Order: {}", runtime.config().execution_order);
    println!();
    Ok((runtime, definition))
}

async fn run_pipeline(file: PathBuf, data_dir: Option<PathBuf>) -> Result<()> {
    let (runtime, definition) = load(&file, data_dir).await?;

    let mut events = runtime.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ExecutionEvent::NodeStarted { node, node_type, .. } => {
                    println!("  Starting node: {} ({})", node, node_type);
                }
                ExecutionEvent::NodeFinished {
                    node,
                    status: NodeStatus::Completed,
                    duration_ms,
                    ..
                } => {
                    println!("  Node {} completed in {}ms", node, duration_ms);
                }
                ExecutionEvent::NodeFinished { node, error, .. } => {
                    println!("  Node {} failed: {}", node, error.unwrap_or_default());
                }
                ExecutionEvent::NodeEvent { node, event, .. } => match event {
                    NodeEvent::Info { message } => println!("     [{}] {}", node, message),
                    NodeEvent::Warning { message } => println!("     [{}] warning: {}", node, message),
                },
                ExecutionEvent::WorkflowCompleted { .. } => break,
                _ => {}
            }
        }
    });

    let report = runtime.run_workflow(&definition.name).await?;
    let _ = event_task.await;

    println!();
    println!("Run summary:");
    println!("   Run ID: {}", report.run_id);
    println!("   Status: {}", report.status);
    println!("   Executed: {}", report.executed.join(", "));
    println!("   Duration: {}ms", report.duration_ms);

    for node in runtime.list_nodes(&definition.name).await? {
        if let Some(output) = &node.output {
            println!("   {} -> {}", node.name, output.display());
        }
    }

    if !report.failures.is_empty() {
        println!();
        for failure in &report.failures {
            println!("   {} ({:?}): {}", failure.node, failure.kind, failure.error);
        }
        bail!("{} node(s) failed", report.failures.len());
    }

    Ok(())
}

async fn preview_node(
    file: PathBuf,
    node: String,
    limit: usize,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let (runtime, definition) = load(&file, data_dir).await?;
    let report = runtime.run_workflow(&definition.name).await?;
    if let Some(failure) = report.failure(&node) {
        bail!("node '{}' failed: {}", node, failure.error);
    }

    let table = runtime.preview(&definition.name, &node, limit).await?;
    println!("{}", serde_json::to_string_pretty(&table.to_records())?);
    Ok(())
}

/// Static checks on names, node types, join modes, predicates and table references.
fn check_pipeline(
    definition: &PipelineDefinition,
    registry: &NodeRegistry,
) -> Result<Vec<String>> {
    validate_name(&definition.name)?;

    let engine = LocalEngine;
    let mut warnings = Vec::new();
    let mut names = HashSet::new();
    let mut produced = HashSet::new();
    // Tables resolve as `<root>/<table>/<table>.parquet`, so only a node whose
    // output table carries its own name can be referenced.
    let resolvable: HashSet<String> = definition
        .nodes
        .iter()
        .enumerate()
        .map(|(idx, spec)| node_name(spec, idx))
        .zip(&definition.nodes)
        .filter(|(name, spec)| spec.kind.output_table(name) == name.as_str())
        .map(|(name, _)| name)
        .collect();

    for (idx, spec) in definition.nodes.iter().enumerate() {
        let name = node_name(spec, idx);
        validate_name(&name)?;
        if !names.insert(name.clone()) {
            bail!("duplicate node name '{}'", name);
        }
        registry.create_node(&spec.kind)?;
        match &spec.kind {
            NodeKind::Filter { filter_expr, .. } => engine.validate_predicate(filter_expr)?,
            NodeKind::Join { on, how, .. } => engine.validate_join(on, how)?,
            NodeKind::Read { .. } => {}
        }

        for table in spec.kind.references() {
            if produced.contains(table) {
                continue;
            }
            if resolvable.contains(table) {
                warnings.push(format!(
                    "node '{}' reads '{}' before it is produced; insertion-order runs will fail it",
                    name, table
                ));
            } else {
                warnings.push(format!(
                    "node '{}' reads '{}', but no node named '{}' writes a table of that name",
                    name, table, table
                ));
            }
        }
        if resolvable.contains(&name) {
            produced.insert(name);
        }
    }

    Ok(warnings)
}

fn node_name(spec: &NodeSpec, idx: usize) -> String {
    spec.name.clone().unwrap_or_else(|| format!("node{}", idx + 1))
}

fn validate_pipeline(file: PathBuf) -> Result<()> {
    println!("Validating pipeline: {}", file.display());

    let definition = PipelineLoader::load_file(&file)?;
    let warnings = check_pipeline(&definition, &standard_registry())?;

    println!("Pipeline is valid:");
    println!("   Name: {}", definition.name);
    println!("   Nodes: {}", definition.nodes.len());
    for warning in warnings {
        println!("   warning: {}", warning);
    }

    Ok(())
}

fn list_nodes() {
    println!("Available node types:");
    println!();

    let registry = standard_registry();
    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
            for param in metadata.params {
                let marker = if param.required { "required" } else { "optional" };
                println!("      {:<12} {:<9} {}", param.name, marker, param.description);
            }
        } else {
            println!("  {}", node_type);
        }
    }
}

fn create_example_pipeline(output: PathBuf) -> Result<()> {
    let definition = PipelineDefinition {
        name: "example".to_string(),
        description: Some("Join store data with sales and keep large orders".to_string()),
        nodes: vec![
            NodeSpec::new(NodeKind::read("stores.csv")).with_name("stores"),
            NodeSpec::new(NodeKind::read("sales.csv")).with_name("sales"),
            NodeSpec::new(NodeKind::join(
                "stores",
                "sales",
                vec!["store_id".to_string()],
                "inner",
            ))
            .with_name("store_sales"),
            NodeSpec::new(NodeKind::filter("store_sales", "col(\"qty\") > 10"))
                .with_name("large_orders"),
        ],
    };

    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    std::fs::write(
        dir.join("stores.csv"),
        "store_id,city\n1,Oslo\n2,Lima\n3,Pune\n",
    )?;
    std::fs::write(
        dir.join("sales.csv"),
        "store_id,qty,price\n1,4,2.5\n2,12,1.25\n2,30,0.99\n4,50,3.0\n",
    )?;
    std::fs::write(&output, serde_json::to_string_pretty(&definition)?)?;

    println!("Created example pipeline: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  tableflow run --file {}", output.display());
    println!("  tableflow preview --file {} --node large_orders", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(json: &str) -> PipelineDefinition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_check_warns_on_order() {
        let def = definition(
            r#"{"name": "p", "nodes": [
                {"name": "c", "type": "join", "left_table": "a", "right_table": "b", "on": "id"},
                {"name": "a", "type": "read", "file_path": "a.csv"}
            ]}"#,
        );
        let warnings = check_pipeline(&def, &standard_registry()).unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("before it is produced"));
        assert!(warnings[1].contains("no node named 'b'"));
    }

    #[test]
    fn test_check_follows_node_directories() {
        let def = definition(
            r#"{"name": "p", "nodes": [
                {"name": "r", "type": "read", "file_path": "a.csv", "table_name": "custom"},
                {"name": "f", "type": "filter", "input_table": "custom", "filter_expr": "id > 1"},
                {"name": "g", "type": "filter", "input_table": "r", "filter_expr": "id > 1"},
                {"name": "s", "type": "read", "file_path": "s.csv"},
                {"name": "h", "type": "filter", "input_table": "s", "filter_expr": "id > 1"}
            ]}"#,
        );
        let warnings = check_pipeline(&def, &standard_registry()).unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("'f' reads 'custom'"));
        assert!(warnings[1].contains("'g' reads 'r'"));
    }

    #[test]
    fn test_check_rejects_bad_nodes() {
        let bad = [
            r#"{"name": "p", "nodes": [{"type": "filter", "input_table": "a", "filter_expr": "x >"}]}"#,
            r#"{"name": "p", "nodes": [{"type": "join", "left_table": "a", "right_table": "b", "on": "id", "how": "diagonal"}]}"#,
            r#"{"name": "p", "nodes": [{"name": "a", "type": "read", "file_path": "a.csv"}, {"name": "a", "type": "read", "file_path": "b.csv"}]}"#,
            r#"{"name": "a/b", "nodes": []}"#,
        ];
        for json in bad {
            assert!(check_pipeline(&definition(json), &standard_registry()).is_err(), "{}", json);
        }
    }
}
