//! Graph-level error type.

use thiserror::Error;

/// Errors produced while constructing or validating a [`crate::Graph`].
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node was looked up by name and no node carries it.
    #[error("node '{0}' not found")]
    NodeNotFound(String),

    /// A node was looked up by internal (dot-path) name and no node carries it.
    #[error("node with internal name '{0}' not found")]
    InternalNodeNotFound(String),

    /// Two or more nodes in the same graph share a `name`.
    #[error("duplicate node name: '{0}'")]
    DuplicateNodeName(String),

    /// A node name contains a reserved character (`.` or `%`).
    #[error("node name '{0}' may not contain '.' or '%'")]
    IllegalNodeName(String),

    /// `start_at` does not resolve to a node in the graph.
    #[error("start node '{0}' is not present in the graph")]
    StartNodeMissing(String),

    /// The graph does not have exactly one `success` node.
    #[error("graph must have exactly one success node, found {0}")]
    SuccessNodeCount(usize),

    /// The graph does not have exactly one `fail` node.
    #[error("graph must have exactly one fail node, found {0}")]
    FailNodeCount(usize),

    /// `next` or `on_failure` references a node that doesn't exist.
    #[error("graph references missing neighbours: {0:?}")]
    MissingNeighbours(Vec<String>),

    /// The union of `next` and `on_failure` edges contains a cycle.
    #[error("graph contains a cycle")]
    CycleDetected,

    /// A composite node's branch configuration is invalid.
    #[error("invalid composite node '{name}': {message}")]
    InvalidComposite { name: String, message: String },
}
