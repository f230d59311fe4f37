//! Pipeline entry-point handlers — the HTTP analogue of the `cli` crate's
//! `execute`/`execute-single-node`/`execute-single-branch` subcommands.
//! Grounded in `original_source/magnus/pipeline.py`'s three eponymous entry
//! points: exactly the re-entry hooks §2 calls out for fan-out workers and
//! external orchestrators, which is why this crate exposes them as REST
//! endpoints rather than the teacher's original workflow-CRUD surface (the
//! latter needed a database-backed workflow store this transformed crate
//! does not carry — see DESIGN.md's trim log).

use std::collections::HashMap;
use std::path::PathBuf;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use graph::MapVariable;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub pipeline: PathBuf,
    #[serde(default)]
    pub variables: Option<PathBuf>,
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default, rename = "run_id")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub use_cached: bool,
    #[serde(default)]
    pub use_cached_force: bool,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSingleNodeRequest {
    pub pipeline: PathBuf,
    #[serde(default)]
    pub variables: Option<PathBuf>,
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub tag: Option<String>,
    pub run_id: String,
    pub step_name: String,
    #[serde(default)]
    pub map_variable: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteSingleBranchRequest {
    pub pipeline: PathBuf,
    #[serde(default)]
    pub variables: Option<PathBuf>,
    #[serde(default)]
    pub config: Option<PathBuf>,
    #[serde(default)]
    pub tag: Option<String>,
    pub run_id: String,
    pub branch_name: String,
    #[serde(default)]
    pub map_variable: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub run_id: Option<String>,
    pub status: &'static str,
}

fn to_map_variable(pairs: HashMap<String, String>) -> MapVariable {
    let mut mv = MapVariable::new();
    for (name, value) in pairs {
        mv.insert(name, value);
    }
    mv
}

/// Maps an [`engine::EngineError`] onto the HTTP status a caller should act
/// on: validation/config problems are the caller's fault (422), a dag-hash
/// mismatch on resume is a conflict with what's already recorded (409),
/// everything else is an internal failure including `PipelineFailed`
/// (the pipeline ran to completion but its Run Log ended in `FAIL`, which
/// callers distinguish from a 5xx by inspecting the Run Log itself).
fn status_for(err: &engine::EngineError) -> StatusCode {
    use engine::EngineError::*;
    match err {
        Graph(_) | Config(_) | InvalidComposite { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DagHashMismatch => StatusCode::CONFLICT,
        PipelineFailed => StatusCode::OK,
        RunLog(_) | Catalog(_) | Secrets(_) | InfiniteLoop(_) | NodeExecutionFailure { .. } | ExternalServiceFailure(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub async fn execute(Json(req): Json<ExecuteRequest>) -> (StatusCode, Json<Value>) {
    let run_id = req.run_id.clone();
    let result = engine::execute_pipeline(
        &req.pipeline,
        req.variables.as_deref(),
        req.config.as_deref(),
        req.run_id,
        req.tag,
        req.use_cached,
        req.use_cached_force,
        req.parameters,
    )
    .await;

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!(RunAccepted { run_id, status: "success" })),
        ),
        Err(engine::EngineError::PipelineFailed) => (
            StatusCode::OK,
            Json(serde_json::json!(RunAccepted { run_id, status: "fail" })),
        ),
        Err(err) => {
            let status = status_for(&err);
            (status, Json(serde_json::json!({"error": err.to_string()})))
        }
    }
}

pub async fn execute_single_node(Json(req): Json<ExecuteSingleNodeRequest>) -> (StatusCode, Json<Value>) {
    let result = engine::execute_single_node(
        &req.pipeline,
        req.variables.as_deref(),
        req.config.as_deref(),
        req.run_id.clone(),
        req.tag,
        &req.step_name,
        to_map_variable(req.map_variable),
    )
    .await;

    respond(result, req.run_id)
}

pub async fn execute_single_branch(Json(req): Json<ExecuteSingleBranchRequest>) -> (StatusCode, Json<Value>) {
    let result = engine::execute_single_branch(
        &req.pipeline,
        req.variables.as_deref(),
        req.config.as_deref(),
        req.run_id.clone(),
        req.tag,
        &req.branch_name,
        to_map_variable(req.map_variable),
    )
    .await;

    respond(result, req.run_id)
}

fn respond(result: Result<(), engine::EngineError>, run_id: String) -> (StatusCode, Json<Value>) {
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!(RunAccepted { run_id: Some(run_id), status: "success" })),
        ),
        Err(engine::EngineError::PipelineFailed) => (
            StatusCode::OK,
            Json(serde_json::json!(RunAccepted { run_id: Some(run_id), status: "fail" })),
        ),
        Err(err) => {
            let status = status_for(&err);
            (status, Json(serde_json::json!({"error": err.to_string()})))
        }
    }
}
