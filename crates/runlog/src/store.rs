//! `RunLogStore` — the provider contract §6 specifies for persisting the
//! Run/Step/Branch/Attempt Log tree. Method names match the spec verbatim.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RunLogError;
use crate::models::{AttemptLog, CodeIdentity, GraphLog, RunLog, StepLog};

#[async_trait]
pub trait RunLogStore: Send + Sync {
    async fn create_run_log(&self, run_id: &str) -> Result<RunLog, RunLogError>;

    async fn put_run_log(&self, run_log: RunLog) -> Result<(), RunLogError>;

    async fn get_run_log_by_id(&self, run_id: &str, full: bool) -> Result<RunLog, RunLogError>;

    /// Construct a fresh, `Processing` step log. Does not persist it —
    /// callers pass the result to [`RunLogStore::add_step_log`].
    async fn create_step_log(&self, name: &str, internal_name: &str) -> Result<StepLog, RunLogError> {
        let _ = name;
        Ok(StepLog::new(internal_name, "unknown"))
    }

    async fn add_step_log(&self, step_log: StepLog, run_id: &str) -> Result<(), RunLogError>;

    async fn get_step_log(&self, internal_name: &str, run_id: &str) -> Result<StepLog, RunLogError>;

    /// Construct a fresh, `Processing` branch log (or, for the root branch
    /// `""`, the run log itself) keyed by `internal_branch_name`.
    async fn create_branch_log(&self, internal_branch_name: &str) -> Result<GraphLog, RunLogError>;

    async fn add_branch_log(&self, branch_log: GraphLog, run_id: &str) -> Result<(), RunLogError>;

    async fn get_branch_log(&self, internal_branch_name: &str, run_id: &str) -> Result<GraphLog, RunLogError>;

    fn create_attempt_log(&self, attempt_number: u32) -> AttemptLog {
        AttemptLog::started(attempt_number)
    }

    /// Attaches a git SHA code identity when run inside a git checkout,
    /// matching `BaseExecutor.add_code_identities`'s default behaviour.
    /// Stores that need a different identity (docker image id, …) override
    /// this.
    async fn create_code_identity(&self) -> Result<CodeIdentity, RunLogError> {
        Ok(git_code_identity())
    }

    async fn get_parameters(&self, run_id: &str) -> Result<HashMap<String, Value>, RunLogError>;

    async fn set_parameters(
        &self,
        run_id: &str,
        parameters: HashMap<String, Value>,
    ) -> Result<(), RunLogError>;
}

/// Best-effort `git rev-parse HEAD`; "unknown" outside a git checkout.
fn git_code_identity() -> CodeIdentity {
    let sha = std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned());

    CodeIdentity {
        identity_type: "git_sha".to_owned(),
        identity: sha,
    }
}
