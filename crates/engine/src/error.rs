//! Engine-level error type — composes the lookup-miss and validation
//! errors of the crates the traversal core depends on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] graph::GraphError),

    #[error(transparent)]
    RunLog(#[from] runlog::RunLogError),

    #[error(transparent)]
    Catalog(#[from] catalog::CatalogError),

    #[error(transparent)]
    Secrets(#[from] secrets::SecretsError),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// `previous == current` during `execute_graph`'s traversal loop — the
    /// static validator already proves acyclicity, but this runtime guard
    /// is kept as belt-and-braces, per DESIGN NOTES.
    #[error("potentially running in an infinite loop at node '{0}'")]
    InfiniteLoop(String),

    /// A resumed run's `dag_hash` does not match the current DAG, and
    /// `use_cached_force` was not set.
    #[error("the previous dag does not match the current one (dag_hash mismatch); use --use-cached-force to override")]
    DagHashMismatch,

    /// A task node's command failed every attempt its `retry` budget
    /// allowed.
    #[error("node '{node}' failed after {attempts} attempt(s): {message}")]
    NodeExecutionFailure {
        node: String,
        attempts: u32,
        message: String,
    },

    /// The pipeline's Run Log ended in `FAIL`.
    #[error("pipeline execution failed")]
    PipelineFailed,

    /// A composite node's expansion is structurally invalid (empty
    /// `parallel` branches, `map` parameter not a list, …).
    #[error("invalid composite node '{name}': {message}")]
    InvalidComposite { name: String, message: String },

    /// A provider (store/catalog/secrets) I/O call failed in a way that
    /// doesn't map onto a more specific variant above.
    #[error("external service failure: {0}")]
    ExternalServiceFailure(String),
}
