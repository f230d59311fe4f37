//! Graph data model: nodes, branches and the validation rules that make a
//! pipeline document safe to execute.

mod error;
mod graph;
mod hash;
mod node;
pub mod naming;

pub use error::GraphError;
pub use graph::Graph;
pub use hash::dag_hash;
pub use node::{CatalogSettings, CommandType, Node, NodeConfig, NodeKind, Parameters};
pub use naming::MapVariable;

/// Which half of a catalog sync a pattern list applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Get,
    Put,
}
