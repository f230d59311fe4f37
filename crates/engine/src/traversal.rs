//! The executor-agnostic traversal core: `execute_graph`, `execute_from_graph`
//! and `execute_node`, plus the composite-node expansion and resume-gate
//! helpers they depend on.
//!
//! Grounded in `original_source/magnus/executor.py`'s `BaseExecutor` (the
//! three eponymous methods, `get_status_and_next_node_name`,
//! `is_eligible_for_rerun`, `sync_catalog`) and `original_source/magnus/nodes.py`'s
//! `ParallelNode`/`MapNode`/`DagNode.execute_as_graph` (branch log creation,
//! fan-out, waiting/success/fail reconciliation). Every function here is a
//! free function taking an explicit [`ExecutionContext`] rather than a
//! method on it — see DESIGN.md's Open Question log for why the singleton
//! executor pattern wasn't carried over. "In most cases, this logic need not
//! be touched" holds here exactly as it did for the source material: a new
//! [`crate::executor::Executor`] only ever has to implement `trigger_job`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;

use graph::{naming, CommandType, Graph, MapVariable, Node, NodeKind, Stage};
use nodes::CommandOutcome;
use runlog::{BranchLog, GraphLog, Status, StepLog};

use crate::context::ExecutionContext;
use crate::error::EngineError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Traverse `graph` depth-first from its `start_at`, executing each node in
/// turn until a terminal (`success`/`fail`) node is reached or a node goes
/// `Triggered` (handed off to an external system that will reconcile its own
/// status later).
pub fn execute_graph(
    ctx: Arc<ExecutionContext>,
    graph: Graph,
    map_variable: MapVariable,
) -> BoxFuture<'static, Result<(), EngineError>> {
    Box::pin(async move {
        let mut current_node = graph.start_at.clone();
        let mut previous_node: Option<String> = None;

        loop {
            let working_on = graph.get_node_by_name(&current_node)?.clone();

            if previous_node.as_deref() == Some(current_node.as_str()) {
                return Err(EngineError::InfiniteLoop(current_node));
            }
            previous_node = Some(current_node.clone());

            execute_from_graph(ctx.clone(), working_on.clone(), map_variable.clone()).await?;

            let (status, next_node_name) =
                get_status_and_next_node_name(&ctx, &working_on, &graph, &map_variable).await?;

            if status == Status::Triggered {
                break;
            }
            if working_on.is_terminal_node() {
                break;
            }

            current_node = next_node_name.ok_or_else(|| EngineError::InvalidComposite {
                name: working_on.name.clone(),
                message: "node has no next node and is not a terminal node".to_owned(),
            })?;
        }

        Ok(())
    })
}

/// Execute a single node: build and persist its step log, route terminal
/// nodes and composite nodes to the right place, and skip the node entirely
/// if a resumed run already completed it successfully.
pub fn execute_from_graph(
    ctx: Arc<ExecutionContext>,
    node: Node,
    map_variable: MapVariable,
) -> BoxFuture<'static, Result<(), EngineError>> {
    Box::pin(async move {
        let step_log_name = node.get_step_log_name(&map_variable);
        let mut step_log = ctx.run_log_store.create_step_log(&node.name, &step_log_name).await?;
        let code_identity = ctx.run_log_store.create_code_identity().await?;
        step_log.code_identities.push(code_identity);
        step_log.step_type = node.node_type().to_owned();
        step_log.status = Status::Processing;
        ctx.run_log_store.add_step_log(step_log, &ctx.run_id).await?;

        if node.kind.is_terminal() {
            execute_node(&ctx, &node, &map_variable).await?;
            return Ok(());
        }

        if !is_eligible_for_rerun(&ctx, &node, &map_variable).await? {
            return Ok(());
        }

        if node.kind.is_composite() {
            expand_composite(ctx.clone(), node, map_variable).await?;
            return Ok(());
        }

        ctx.executor.trigger_job(&ctx, &node, &map_variable).await
    })
}

/// Run a task/success/fail/as-is node's retry loop: keep attempting until
/// `get_max_attempts` is exhausted or an attempt succeeds, then sync the
/// catalog's `put` patterns and persist the final step log.
///
/// Failures are absorbed into the step log's status, never propagated as an
/// `Err` — that mirrors the source's `execute_node`, which catches every
/// exception from `node.execute` so the traversal loop can route to the
/// fail/on-failure node instead of aborting the whole run.
pub async fn execute_node(ctx: &ExecutionContext, node: &Node, map_variable: &MapVariable) -> Result<(), EngineError> {
    let max_attempts = node.get_max_attempts();
    let step_log_name = node.get_step_log_name(map_variable);
    let mut step_log = ctx.run_log_store.get_step_log(&step_log_name, &ctx.run_id).await?;

    let parameters = ctx.run_log_store.get_parameters(&ctx.run_id).await?;
    let data_catalogs_get = sync_catalog(ctx, node, &mut step_log, Stage::Get, None).await?;

    let mock = step_log.mock;
    let mut attempts = 0u32;

    while attempts < max_attempts {
        let attempt_number = attempts + 1;
        let mut attempt_log = ctx.run_log_store.create_attempt_log(attempt_number);

        match run_node_once(ctx, node, &parameters, map_variable, mock).await {
            Ok(set_parameters) => {
                attempt_log.finish(Status::Success, None);
                step_log.attempts.push(attempt_log);
                step_log.status = Status::Success;
                if !set_parameters.is_empty() {
                    ctx.run_log_store.set_parameters(&ctx.run_id, set_parameters).await?;
                }
                break;
            }
            Err(message) => {
                attempt_log.finish(Status::Fail, Some(message));
                step_log.attempts.push(attempt_log);
                attempts += 1;
                if attempts == max_attempts {
                    step_log.status = Status::Fail;
                }
            }
        }
    }

    sync_catalog(ctx, node, &mut step_log, Stage::Put, data_catalogs_get.as_deref()).await?;
    ctx.run_log_store.add_step_log(step_log, &ctx.run_id).await?;
    Ok(())
}

/// One attempt at a node's actual work. Returns the parameters the node set
/// (if any) on success, or the failure message on failure — callers fold
/// this into an `AttemptLog` and decide whether to retry.
async fn run_node_once(
    ctx: &ExecutionContext,
    node: &Node,
    parameters: &HashMap<String, Value>,
    map_variable: &MapVariable,
    mock: bool,
) -> Result<HashMap<String, Value>, String> {
    match &node.kind {
        NodeKind::Task => {
            if mock {
                return Ok(HashMap::new());
            }
            let command_type = node.config.command_type.unwrap_or(CommandType::Shell);
            let command = node
                .config
                .command
                .as_deref()
                .ok_or_else(|| "task node has no command configured".to_owned())?;

            let outcome = nodes::executor_for(command_type)
                .run(command, parameters, map_variable)
                .await
                .map_err(|e| e.to_string())?;

            match outcome {
                CommandOutcome::Success { set_parameters } => Ok(set_parameters),
                CommandOutcome::Failure { message } => Err(message),
            }
        }
        NodeKind::AsIs { .. } => Ok(HashMap::new()),
        // Both terminal markers are dummy nodes: their own attempt always
        // succeeds, only the branch or run they belong to is flipped to
        // SUCCESS/FAIL. Swallowing the branch-log update's error here mirrors
        // `original_source/magnus/nodes.py`'s `SuccessNode.execute` and
        // `FailNode.execute`, which both wrap the update in try/except and
        // unconditionally mark the attempt SUCCESS in a finally block — a
        // transient branch-log hiccup can't turn a dummy marker into a
        // failed/retried step.
        NodeKind::Success => {
            let _ = mark_owning_branch(ctx, node, map_variable, Status::Success).await;
            Ok(HashMap::new())
        }
        NodeKind::Fail => {
            let _ = mark_owning_branch(ctx, node, map_variable, Status::Fail).await;
            Ok(HashMap::new())
        }
        NodeKind::Parallel { .. } | NodeKind::Map { .. } | NodeKind::Dag { .. } => {
            unreachable!("composite nodes are dispatched through expand_composite, not run_node_once")
        }
    }
}

async fn mark_owning_branch(
    ctx: &ExecutionContext,
    node: &Node,
    map_variable: &MapVariable,
    status: Status,
) -> Result<(), EngineError> {
    let branch_name = node.get_branch_log_name(map_variable);
    let mut graph_log = ctx.run_log_store.get_branch_log(&branch_name, &ctx.run_id).await?;
    graph_log.set_status(status);
    ctx.run_log_store.add_branch_log(graph_log, &ctx.run_id).await?;
    Ok(())
}

/// Decide what node comes next after `current_node` finished, and return its
/// final status. A failed node routes to its own `on_failure` target, or the
/// graph's single `fail` node if it didn't name one.
pub async fn get_status_and_next_node_name(
    ctx: &ExecutionContext,
    current_node: &Node,
    graph: &Graph,
    map_variable: &MapVariable,
) -> Result<(Status, Option<String>), EngineError> {
    let step_log = ctx
        .run_log_store
        .get_step_log(&current_node.get_step_log_name(map_variable), &ctx.run_id)
        .await?;

    let mut next_node_name = current_node.get_next_node().map(str::to_owned);

    if step_log.status == Status::Fail {
        next_node_name = current_node
            .get_on_failure_node()
            .map(str::to_owned)
            .or_else(|| graph.get_fail_node().ok().map(|n| n.name.clone()));
    }

    Ok((step_log.status, next_node_name))
}

/// True if a resumed run should actually execute `node`: always true for a
/// fresh run, true if the previous run never reached this node or didn't
/// finish it successfully (in which case we detach from the cache for the
/// remainder of the run), false if the previous run already succeeded it.
pub async fn is_eligible_for_rerun(
    ctx: &ExecutionContext,
    node: &Node,
    map_variable: &MapVariable,
) -> Result<bool, EngineError> {
    let previous = ctx.previous_run_log.lock().await.clone();
    let Some(previous_run_log) = previous else {
        return Ok(true);
    };

    let step_log_name = node.get_step_log_name(map_variable);
    let Some(previous_step) = previous_run_log.search_step_by_internal_name(&step_log_name) else {
        // Not in the previous run at all (e.g. a newly added node) — run it,
        // but don't detach: later nodes may still be resumable.
        return Ok(true);
    };

    if previous_step.status == Status::Success {
        let mut step_log = ctx.run_log_store.get_step_log(&step_log_name, &ctx.run_id).await?;
        step_log.mock = true;
        step_log.status = Status::Success;
        step_log.message = Some("node execution successful in previous run, skipping it".to_owned());
        ctx.run_log_store.add_step_log(step_log, &ctx.run_id).await?;
        return Ok(false);
    }

    ctx.detach_from_cache().await;
    Ok(true)
}

/// Copy catalog items in or out of the compute data folder per the node's
/// `get`/`put` patterns, recording what moved on `step_log`.
///
/// Each pattern's results are accumulated rather than overwriting the
/// previous pattern's, unlike the source's `sync_catalog` (which reassigns
/// `data_catalogs` inside the loop and so only ever reports the last
/// pattern) — a plain generalization to handle more than one pattern
/// correctly, not a deliberate behavior change worth flagging as a redesign.
pub async fn sync_catalog(
    ctx: &ExecutionContext,
    node: &Node,
    step_log: &mut StepLog,
    stage: Stage,
    synced_catalogs: Option<&[catalog::CatalogItem]>,
) -> Result<Option<Vec<catalog::CatalogItem>>, EngineError> {
    let Some(settings) = node.get_catalog_settings() else {
        return Ok(None);
    };
    let patterns = settings.patterns_for(stage);
    if patterns.is_empty() {
        return Ok(None);
    }

    let compute_data_folder = settings
        .compute_data_folder
        .clone()
        .unwrap_or_else(|| ctx.catalog_handler.compute_data_folder().to_owned());

    let mut data_catalogs = Vec::new();
    for pattern in patterns {
        let items = match stage {
            Stage::Get => {
                ctx.catalog_handler
                    .get(pattern, &ctx.run_id, &compute_data_folder, synced_catalogs)
                    .await?
            }
            Stage::Put => {
                ctx.catalog_handler
                    .put(pattern, &ctx.run_id, &compute_data_folder, synced_catalogs)
                    .await?
            }
        };
        data_catalogs.extend(items);
    }

    if !data_catalogs.is_empty() {
        step_log.data_catalogs.extend(data_catalogs.clone());
    }
    Ok(Some(data_catalogs))
}

// ---------------------------------------------------------------------------
// Composite node expansion
// ---------------------------------------------------------------------------

fn expand_composite(
    ctx: Arc<ExecutionContext>,
    node: Node,
    map_variable: MapVariable,
) -> BoxFuture<'static, Result<(), EngineError>> {
    Box::pin(async move {
        if ctx.executor.renders_only() {
            return Err(EngineError::InvalidComposite {
                name: node.name.clone(),
                message: "composite nodes are not supported in rendering mode".to_owned(),
            });
        }

        match node.kind.clone() {
            NodeKind::Parallel { branches } => expand_parallel(ctx, node, branches, map_variable).await,
            NodeKind::Map {
                iterate_on,
                iterate_as,
                branch,
            } => expand_map(ctx, node, iterate_on, iterate_as, *branch, map_variable).await,
            NodeKind::Dag { branch, .. } => expand_dag(ctx, node, *branch, map_variable).await,
            _ => unreachable!("expand_composite is only called on composite nodes"),
        }
    })
}

async fn expand_parallel(
    ctx: Arc<ExecutionContext>,
    node: Node,
    branches: Vec<(String, Graph)>,
    map_variable: MapVariable,
) -> Result<(), EngineError> {
    for (branch_name, _) in &branches {
        let effective = naming::resolve_map_placeholders(branch_name, &map_variable);
        let mut branch_log = BranchLog::new(effective);
        branch_log.status = Status::Processing;
        ctx.run_log_store
            .add_branch_log(GraphLog::Branch(branch_log), &ctx.run_id)
            .await?;
    }

    if ctx.executor.is_parallel_execution() {
        let mut set = JoinSet::new();
        for (_, sub_graph) in branches.clone() {
            let ctx = ctx.clone();
            let map_variable = map_variable.clone();
            set.spawn(async move { execute_graph(ctx, sub_graph, map_variable).await });
        }
        while let Some(result) = set.join_next().await {
            result.map_err(|e| EngineError::ExternalServiceFailure(format!("branch task panicked: {e}")))??;
        }
    } else {
        for (_, sub_graph) in branches.clone() {
            execute_graph(ctx.clone(), sub_graph, map_variable.clone()).await?;
        }
    }

    let mut step_success = true;
    let mut waiting = false;
    for (branch_name, _) in &branches {
        let effective = naming::resolve_map_placeholders(branch_name, &map_variable);
        let branch_log = ctx.run_log_store.get_branch_log(&effective, &ctx.run_id).await?;
        match branch_log.status() {
            Status::Fail => step_success = false,
            Status::Processing => waiting = true,
            _ => {}
        }
    }

    finish_composite_step(&ctx, &node, &map_variable, step_success, waiting).await
}

async fn expand_map(
    ctx: Arc<ExecutionContext>,
    node: Node,
    iterate_on: String,
    iterate_as: String,
    branch: Graph,
    map_variable: MapVariable,
) -> Result<(), EngineError> {
    let run_log = ctx.run_log_store.get_run_log_by_id(&ctx.run_id, false).await?;
    let values = run_log
        .parameters
        .get(&iterate_on)
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::InvalidComposite {
            name: node.name.clone(),
            message: format!("expected parameter '{iterate_on}' to be a list, was it ever set?"),
        })?
        .clone();

    let branch_keys: Vec<String> = values
        .iter()
        .map(|v| format!("{}.{}", node.internal_name, map_value_literal(v)))
        .collect();

    for key in &branch_keys {
        let effective = naming::resolve_map_placeholders(key, &map_variable);
        let mut branch_log = BranchLog::new(effective);
        branch_log.status = Status::Processing;
        ctx.run_log_store
            .add_branch_log(GraphLog::Branch(branch_log), &ctx.run_id)
            .await?;
    }

    if ctx.executor.is_parallel_execution() {
        let mut set = JoinSet::new();
        for value in &values {
            let mut effective_mv = map_variable.clone();
            effective_mv.insert(iterate_as.clone(), map_value_literal(value));
            let ctx = ctx.clone();
            let sub_graph = branch.clone();
            set.spawn(async move { execute_graph(ctx, sub_graph, effective_mv).await });
        }
        while let Some(result) = set.join_next().await {
            result.map_err(|e| EngineError::ExternalServiceFailure(format!("branch task panicked: {e}")))??;
        }
    } else {
        for value in &values {
            let mut effective_mv = map_variable.clone();
            effective_mv.insert(iterate_as.clone(), map_value_literal(value));
            execute_graph(ctx.clone(), branch.clone(), effective_mv).await?;
        }
    }

    let mut step_success = true;
    let mut waiting = false;
    for key in &branch_keys {
        let effective = naming::resolve_map_placeholders(key, &map_variable);
        let branch_log = ctx.run_log_store.get_branch_log(&effective, &ctx.run_id).await?;
        match branch_log.status() {
            Status::Fail => step_success = false,
            Status::Processing => waiting = true,
            _ => {}
        }
    }

    finish_composite_step(&ctx, &node, &map_variable, step_success, waiting).await
}

async fn expand_dag(
    ctx: Arc<ExecutionContext>,
    node: Node,
    branch: Graph,
    map_variable: MapVariable,
) -> Result<(), EngineError> {
    let effective_branch = naming::resolve_map_placeholders(&branch.internal_branch_name, &map_variable);

    let mut branch_log = BranchLog::new(effective_branch.clone());
    branch_log.status = Status::Processing;
    ctx.run_log_store
        .add_branch_log(GraphLog::Branch(branch_log), &ctx.run_id)
        .await?;

    execute_graph(ctx.clone(), branch, map_variable.clone()).await?;

    let branch_log = ctx.run_log_store.get_branch_log(&effective_branch, &ctx.run_id).await?;
    let waiting = matches!(branch_log.status(), Status::Processing);
    let step_success = !matches!(branch_log.status(), Status::Fail);

    finish_composite_step(&ctx, &node, &map_variable, step_success, waiting).await
}

async fn finish_composite_step(
    ctx: &ExecutionContext,
    node: &Node,
    map_variable: &MapVariable,
    step_success: bool,
    waiting: bool,
) -> Result<(), EngineError> {
    let effective_internal = node.get_step_log_name(map_variable);
    let mut step_log = ctx.run_log_store.get_step_log(&effective_internal, &ctx.run_id).await?;
    step_log.status = if step_success {
        if waiting {
            Status::Processing
        } else {
            Status::Success
        }
    } else {
        Status::Fail
    };
    ctx.run_log_store.add_step_log(step_log, &ctx.run_id).await?;
    Ok(())
}

fn map_value_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
