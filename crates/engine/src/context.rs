//! The explicit run context threaded through every traversal call.
//!
//! The original implementation reaches its providers through a module-level
//! `global_executor` singleton (`original_source/magnus/pipeline.py`,
//! `prepare_configurations`). Rust has no equivalent of reassigning a module
//! global at runtime without `unsafe` or thread-locals, and a singleton would
//! make it impossible to run two pipelines in the same process — so this
//! context is passed by `Arc` reference instead, matching the explicit
//! dependency style the teacher's `WorkflowExecutor` used for its database
//! handle.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use catalog::CatalogHandler;
use runlog::{RunLog, RunLogStore};
use secrets::SecretsHandler;

use crate::executor::Executor;

/// Everything a pipeline run needs beyond the graph itself: where its
/// providers live, which run it is, and whether it is resuming another one.
pub struct ExecutionContext {
    pub run_log_store: Arc<dyn RunLogStore>,
    pub catalog_handler: Arc<dyn CatalogHandler>,
    pub secrets_handler: Arc<dyn SecretsHandler>,
    pub executor: Arc<dyn Executor>,

    pub run_id: String,
    pub tag: Option<String>,
    pub use_cached: bool,
    pub use_cached_force: bool,

    /// Set when `use_cached` is true: the run being resumed from. Detaching
    /// (falling off the cached path because of a divergent step) clears
    /// this for the remainder of the run, matching
    /// `BaseExecutor.is_eligible_for_rerun`'s "parameter once false stays
    /// false" behaviour.
    pub previous_run_log: Mutex<Option<RunLog>>,

    pub dag_hash: String,
    pub base_dir: PathBuf,
}

impl ExecutionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_log_store: Arc<dyn RunLogStore>,
        catalog_handler: Arc<dyn CatalogHandler>,
        secrets_handler: Arc<dyn SecretsHandler>,
        executor: Arc<dyn Executor>,
        run_id: impl Into<String>,
        tag: Option<String>,
        use_cached: bool,
        use_cached_force: bool,
        previous_run_log: Option<RunLog>,
        dag_hash: impl Into<String>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_log_store,
            catalog_handler,
            secrets_handler,
            executor,
            run_id: run_id.into(),
            tag,
            use_cached,
            use_cached_force,
            previous_run_log: Mutex::new(previous_run_log),
            dag_hash: dag_hash.into(),
            base_dir: base_dir.into(),
        }
    }

    /// Detach from the cached run permanently: once a step's parameters or
    /// behaviour diverge from the previous run, every subsequent step must
    /// execute for real, never again consult the cache.
    pub async fn detach_from_cache(&self) {
        let mut guard = self.previous_run_log.lock().await;
        *guard = None;
    }

    pub async fn is_attached_to_cache(&self) -> bool {
        self.previous_run_log.lock().await.is_some()
    }
}
