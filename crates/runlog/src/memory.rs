//! An in-memory `RunLogStore` — the default backend for tests and for
//! single-process runs that don't need durability across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::RunLogError;
use crate::models::{
    locate_branch_mut, locate_branch_steps_mut, locate_owning_step_mut, BranchLog, GraphLog, RunLog, StepLog,
};
use crate::store::RunLogStore;

#[derive(Default)]
pub struct InMemoryRunLogStore {
    runs: Arc<Mutex<HashMap<String, RunLog>>>,
}

impl InMemoryRunLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunLogStore for InMemoryRunLogStore {
    async fn create_run_log(&self, run_id: &str) -> Result<RunLog, RunLogError> {
        Ok(RunLog::new(run_id))
    }

    async fn put_run_log(&self, run_log: RunLog) -> Result<(), RunLogError> {
        self.runs.lock().await.insert(run_log.run_id.clone(), run_log);
        Ok(())
    }

    async fn get_run_log_by_id(&self, run_id: &str, _full: bool) -> Result<RunLog, RunLogError> {
        self.runs
            .lock()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))
    }

    async fn add_step_log(&self, step_log: StepLog, run_id: &str) -> Result<(), RunLogError> {
        let mut runs = self.runs.lock().await;
        let run_log = runs
            .get_mut(run_id)
            .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))?;

        let branch_name = crate::models::owning_branch_name(&step_log.internal_name);
        let steps = locate_branch_steps_mut(run_log, &branch_name)
            .ok_or_else(|| RunLogError::BranchLogNotFound(branch_name.clone()))?;
        steps.insert(step_log.internal_name.clone(), step_log);
        Ok(())
    }

    async fn get_step_log(&self, internal_name: &str, run_id: &str) -> Result<StepLog, RunLogError> {
        let runs = self.runs.lock().await;
        let run_log = runs
            .get(run_id)
            .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))?;
        run_log
            .search_step_by_internal_name(internal_name)
            .cloned()
            .ok_or_else(|| RunLogError::StepLogNotFound(internal_name.to_owned()))
    }

    async fn create_branch_log(&self, internal_branch_name: &str) -> Result<GraphLog, RunLogError> {
        if internal_branch_name.is_empty() {
            // The root branch *is* the run log — callers special-case this
            // before persisting, see `engine::executor`.
            return Ok(GraphLog::Branch(BranchLog::new("")));
        }
        Ok(GraphLog::Branch(BranchLog::new(internal_branch_name)))
    }

    async fn add_branch_log(&self, branch_log: GraphLog, run_id: &str) -> Result<(), RunLogError> {
        let branch = match branch_log {
            // The root branch *is* the run log: persist its (possibly
            // changed) status back onto the stored run log rather than
            // silently dropping it, since `success`/`fail` nodes at the
            // root go through this same call path as nested branches.
            GraphLog::Run(run) => {
                let mut runs = self.runs.lock().await;
                let stored = runs
                    .get_mut(run_id)
                    .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))?;
                stored.status = run.status;
                return Ok(());
            }
            GraphLog::Branch(b) => b,
        };
        if branch.internal_branch_name.is_empty() {
            return Ok(());
        }

        let mut runs = self.runs.lock().await;
        let run_log = runs
            .get_mut(run_id)
            .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))?;

        let owning_step_name = crate::models::owning_step_name(&branch.internal_branch_name);
        let owning_step = locate_owning_step_mut(run_log, &owning_step_name)
            .ok_or_else(|| RunLogError::StepLogNotFound(owning_step_name.clone()))?;
        owning_step
            .branches
            .insert(branch.internal_branch_name.clone(), branch);
        Ok(())
    }

    async fn get_branch_log(&self, internal_branch_name: &str, run_id: &str) -> Result<GraphLog, RunLogError> {
        let mut runs = self.runs.lock().await;
        let run_log = runs
            .get_mut(run_id)
            .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))?;

        if internal_branch_name.is_empty() {
            return Ok(GraphLog::Run(run_log.clone()));
        }

        locate_branch_mut(run_log, internal_branch_name)
            .cloned()
            .map(GraphLog::Branch)
            .ok_or_else(|| RunLogError::BranchLogNotFound(internal_branch_name.to_owned()))
    }

    async fn get_parameters(&self, run_id: &str) -> Result<HashMap<String, Value>, RunLogError> {
        self.runs
            .lock()
            .await
            .get(run_id)
            .map(|r| r.parameters.clone())
            .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))
    }

    async fn set_parameters(
        &self,
        run_id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<(), RunLogError> {
        let mut runs = self.runs.lock().await;
        let run_log = runs
            .get_mut(run_id)
            .ok_or_else(|| RunLogError::RunLogNotFound(run_id.to_owned()))?;
        run_log.parameters.extend(parameters);
        Ok(())
    }
}
