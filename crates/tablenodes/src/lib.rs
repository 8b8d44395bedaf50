//! Standard node library
//!
//! Built-in read/join/filter nodes and the in-process tabular engine they run on

mod engine;
mod filter;
mod join;
mod read;

pub use engine::{JoinType, LocalEngine, Predicate, RIGHT_SUFFIX};
pub use filter::{FilterNode, FilterNodeFactory};
pub use join::{JoinNode, JoinNodeFactory};
pub use read::{ReadNode, ReadNodeFactory};

use std::sync::Arc;
use tableruntime::{NodeRegistry, PipelineRuntime, RuntimeConfig};

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) {
    registry.register(Arc::new(ReadNodeFactory));
    registry.register(Arc::new(JoinNodeFactory));
    registry.register(Arc::new(FilterNodeFactory));
}

/// Runtime with the standard nodes and the local engine
pub fn standard_runtime(config: RuntimeConfig) -> PipelineRuntime {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry);
    PipelineRuntime::with_registry(Arc::new(registry), Arc::new(LocalEngine), config)
}
