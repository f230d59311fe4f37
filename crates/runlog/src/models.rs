//! The Run Log data model: `RunLog` owns `StepLog`s, which own `AttemptLog`s
//! and, for composite steps, `BranchLog`s — themselves holding more
//! `StepLog`s. The dataclasses backing this tree weren't part of the
//! retrieved source set; the shape here follows how `executor.py` actually
//! uses them — `run_log.tag`/`use_cached`/`status`/`dag_hash`/`parameters`,
//! `step_log.attempts`/`status`/`mock`/`code_identities`/`user_defined_metrics`,
//! `attempt_log.attempt_numner` (sic, a typo in that source; spelled
//! correctly here) — generalized into a backend-agnostic tree any
//! [`crate::RunLogStore`] implementation can (de)serialize.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use catalog::CatalogItem;

/// Status shared by runs, branches, steps and attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Processing,
    Success,
    Fail,
    /// The node's work was handed off to an external system and will
    /// reconcile its own status later.
    Triggered,
}

/// Per-retry record of a single node execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptLog {
    pub attempt_number: u32,
    pub status: Status,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub message: Option<String>,
}

impl AttemptLog {
    pub fn started(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            status: Status::Processing,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            message: None,
        }
    }

    pub fn finish(&mut self, status: Status, message: Option<String>) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration_ms = Some((end - self.start_time).num_milliseconds());
        self.status = status;
        self.message = message;
    }
}

/// Identifies the code that produced a step's output — a git SHA, a
/// docker image id, etc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeIdentity {
    pub identity_type: String,
    pub identity: String,
}

/// Per-node execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLog {
    pub internal_name: String,
    pub step_type: String,
    pub status: Status,
    /// True when this step was skipped because a previous run already
    /// succeeded it (see the resume gate in `engine::is_eligible_for_rerun`).
    pub mock: bool,
    pub message: Option<String>,
    pub attempts: Vec<AttemptLog>,
    pub user_defined_metrics: HashMap<String, Value>,
    pub code_identities: Vec<CodeIdentity>,
    pub data_catalogs: Vec<CatalogItem>,
    /// Present only for composite steps (`parallel`, `map`, `dag`), keyed
    /// by branch-log-name.
    pub branches: HashMap<String, BranchLog>,
}

impl StepLog {
    pub fn new(internal_name: impl Into<String>, step_type: impl Into<String>) -> Self {
        Self {
            internal_name: internal_name.into(),
            step_type: step_type.into(),
            status: Status::Processing,
            mock: false,
            message: None,
            attempts: Vec::new(),
            user_defined_metrics: HashMap::new(),
            code_identities: Vec::new(),
            data_catalogs: Vec::new(),
            branches: HashMap::new(),
        }
    }
}

/// A sub-graph's run record — structurally identical to a [`RunLog`] minus
/// `run_id`/`dag_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchLog {
    pub internal_branch_name: String,
    pub status: Status,
    pub steps: HashMap<String, StepLog>,
}

impl BranchLog {
    pub fn new(internal_branch_name: impl Into<String>) -> Self {
        Self {
            internal_branch_name: internal_branch_name.into(),
            status: Status::Processing,
            steps: HashMap::new(),
        }
    }
}

/// The durable record of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub run_id: String,
    pub dag_hash: Option<String>,
    pub tag: Option<String>,
    pub use_cached: bool,
    pub original_run_id: Option<String>,
    pub status: Status,
    pub parameters: HashMap<String, Value>,
    pub run_config: Value,
    pub steps: HashMap<String, StepLog>,
}

impl RunLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            dag_hash: None,
            tag: None,
            use_cached: false,
            original_run_id: None,
            status: Status::Processing,
            parameters: HashMap::new(),
            run_config: Value::Null,
            steps: HashMap::new(),
        }
    }

    /// Recursively search every step, including those nested inside
    /// branches, for one whose `internal_name` matches. Used by the resume
    /// gate (`is_eligible_for_rerun`) to scan a previous run's log.
    pub fn search_step_by_internal_name(&self, internal_name: &str) -> Option<&StepLog> {
        search_steps(&self.steps, internal_name)
    }
}

fn search_steps<'a>(steps: &'a HashMap<String, StepLog>, internal_name: &str) -> Option<&'a StepLog> {
    if let Some(step) = steps.get(internal_name) {
        return Some(step);
    }
    for step in steps.values() {
        for branch in step.branches.values() {
            if let Some(found) = search_steps(&branch.steps, internal_name) {
                return Some(found);
            }
        }
    }
    None
}

/// Unifies a [`RunLog`] and a [`BranchLog`] behind one status/steps
/// surface — the root branch (`internal_branch_name == ""`) *is* the run
/// log. `executor.py`'s branch-execution path (`execute_from_graph`/
/// `execute_graph`) reads and writes `run_log.status` and a branch's status
/// through the same call shapes, which is the behavior this enum collapses
/// into one type.
#[derive(Debug, Clone)]
pub enum GraphLog {
    Run(RunLog),
    Branch(BranchLog),
}

impl GraphLog {
    pub fn status(&self) -> Status {
        match self {
            GraphLog::Run(r) => r.status,
            GraphLog::Branch(b) => b.status,
        }
    }

    pub fn set_status(&mut self, status: Status) {
        match self {
            GraphLog::Run(r) => r.status = status,
            GraphLog::Branch(b) => b.status = status,
        }
    }

    pub fn steps(&self) -> &HashMap<String, StepLog> {
        match self {
            GraphLog::Run(r) => &r.steps,
            GraphLog::Branch(b) => &b.steps,
        }
    }
}

/// Where in the step-log tree a given internal name lives: the dot-path of
/// its owning branch (empty for the root).
pub fn owning_branch_name(internal_name: &str) -> String {
    internal_name
        .rsplit_once('.')
        .map(|(parent, _)| parent.to_owned())
        .unwrap_or_default()
}

/// The internal name of the node that owns a given branch (one segment up
/// from the branch's own internal name).
pub fn owning_step_name(internal_branch_name: &str) -> String {
    owning_branch_name(internal_branch_name)
}

/// Locate the steps map a step with the given `internal_name` belongs in
/// (creating nothing — the branch must already exist, as composites create
/// their branch logs before dispatching children).
pub fn locate_branch_steps_mut<'a>(
    run_log: &'a mut RunLog,
    branch_name: &str,
) -> Option<&'a mut HashMap<String, StepLog>> {
    if branch_name.is_empty() {
        return Some(&mut run_log.steps);
    }
    locate_branch_in_steps_mut(&mut run_log.steps, branch_name)
}

fn locate_branch_in_steps_mut<'a>(
    steps: &'a mut HashMap<String, StepLog>,
    branch_name: &str,
) -> Option<&'a mut HashMap<String, StepLog>> {
    for step in steps.values_mut() {
        if step.branches.contains_key(branch_name) {
            return step.branches.get_mut(branch_name).map(|b| &mut b.steps);
        }
        for branch in step.branches.values_mut() {
            if let Some(found) = locate_branch_in_steps_mut(&mut branch.steps, branch_name) {
                return Some(found);
            }
        }
    }
    None
}

/// Locate the step owning a given branch name, to attach a freshly created
/// [`BranchLog`] to its `branches` map.
pub fn locate_owning_step_mut<'a>(
    run_log: &'a mut RunLog,
    internal_name: &str,
) -> Option<&'a mut StepLog> {
    locate_step_in_steps_mut(&mut run_log.steps, internal_name)
}

fn locate_step_in_steps_mut<'a>(
    steps: &'a mut HashMap<String, StepLog>,
    internal_name: &str,
) -> Option<&'a mut StepLog> {
    if steps.contains_key(internal_name) {
        return steps.get_mut(internal_name);
    }
    for step in steps.values_mut() {
        for branch in step.branches.values_mut() {
            if let Some(found) = locate_step_in_steps_mut(&mut branch.steps, internal_name) {
                return Some(found);
            }
        }
    }
    None
}

/// Locate a branch log anywhere in the tree by its full internal branch
/// name (the empty name resolves to the run log itself, handled by the
/// caller before reaching here).
pub fn locate_branch_mut<'a>(
    run_log: &'a mut RunLog,
    internal_branch_name: &str,
) -> Option<&'a mut BranchLog> {
    locate_branch_in_tree_mut(&mut run_log.steps, internal_branch_name)
}

fn locate_branch_in_tree_mut<'a>(
    steps: &'a mut HashMap<String, StepLog>,
    internal_branch_name: &str,
) -> Option<&'a mut BranchLog> {
    for step in steps.values_mut() {
        if step.branches.contains_key(internal_branch_name) {
            return step.branches.get_mut(internal_branch_name);
        }
        for branch in step.branches.values_mut() {
            if let Some(found) = locate_branch_in_tree_mut(&mut branch.steps, internal_branch_name) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_finds_nested_step() {
        let mut run_log = RunLog::new("run-1");
        let mut parallel_step = StepLog::new("parallel_step", "parallel");
        let mut branch = BranchLog::new("parallel_step.branch_a");
        branch
            .steps
            .insert("parallel_step.branch_a.task1".to_owned(), StepLog::new("parallel_step.branch_a.task1", "task"));
        parallel_step
            .branches
            .insert("parallel_step.branch_a".to_owned(), branch);
        run_log.steps.insert("parallel_step".to_owned(), parallel_step);

        let found = run_log
            .search_step_by_internal_name("parallel_step.branch_a.task1")
            .expect("nested step should be found");
        assert_eq!(found.internal_name, "parallel_step.branch_a.task1");
    }

    #[test]
    fn owning_branch_name_is_empty_at_root() {
        assert_eq!(owning_branch_name("start"), "");
        assert_eq!(owning_branch_name("parallel_step.branch_a.task1"), "parallel_step.branch_a");
    }
}
