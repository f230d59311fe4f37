//! Pipeline entry points: `execute`, `execute_single_node`,
//! `execute_single_branch`. Grounded in
//! `original_source/magnus/pipeline.py`'s `prepare_configurations`/`execute`/
//! `execute_single_node`/`execute_single_brach` (the last one's misspelling
//! is a known typo in the source; the exposed name here is spelled
//! correctly — see DESIGN.md).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use graph::{Graph, MapVariable, Node};
use runlog::Status;

use crate::config::{self, ProviderConfig};
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::providers;
use crate::traversal;

struct PreparedPipeline {
    ctx: Arc<ExecutionContext>,
    graph: Graph,
}

fn generate_run_id(run_id: Option<String>) -> String {
    run_id.unwrap_or_else(|| format!("run-{}", uuid::Uuid::new_v4()))
}

/// Parse the pipeline document, build its graph, and assemble the provider
/// stack a run needs — the Rust analogue of `prepare_configurations`.
/// `configuration_file`'s overrides win over the pipeline document's own
/// provider blocks, which in turn win over each provider's own defaults.
#[allow(clippy::too_many_arguments)]
async fn prepare_configurations(
    pipeline_file: &Path,
    variables_file: Option<&Path>,
    configuration_file: Option<&Path>,
    run_id: String,
    tag: Option<String>,
    use_cached: bool,
    use_cached_force: bool,
) -> Result<PreparedPipeline, EngineError> {
    let variables = match variables_file {
        Some(path) => config::load_variables(path)?,
        None => HashMap::new(),
    };

    let (doc, dag_hash) = config::load_pipeline_document(pipeline_file, &variables)?;
    let base_dir: PathBuf = pipeline_file.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

    let builder = config::GraphBuilder::new(&base_dir, &variables);
    let graph = builder.build_root(&doc.dag)?;

    let overrides = match configuration_file {
        Some(path) => Some(config::load_config_file(path)?),
        None => None,
    };

    let pick = |from_overrides: Option<ProviderConfig>, from_doc: Option<ProviderConfig>| from_overrides.or(from_doc);
    let run_log_config = pick(overrides.as_ref().and_then(|o| o.run_log.clone()), doc.run_log.clone());
    let catalog_config = pick(overrides.as_ref().and_then(|o| o.catalog.clone()), doc.catalog.clone());
    let secrets_config = pick(overrides.as_ref().and_then(|o| o.secrets.clone()), doc.secrets.clone());
    let mode_config = pick(overrides.as_ref().and_then(|o| o.mode.clone()), doc.mode.clone());

    let run_log_store = providers::build_run_log_store(run_log_config.as_ref(), &base_dir)?;
    let catalog_handler = providers::build_catalog_handler(catalog_config.as_ref(), &base_dir)?;
    let secrets_handler = providers::build_secrets_handler(secrets_config.as_ref())?;
    let executor = providers::build_executor(mode_config.as_ref())?;

    let previous_run_log = if use_cached || use_cached_force {
        Some(run_log_store.get_run_log_by_id(&run_id, true).await?)
    } else {
        None
    };

    if let Some(previous) = &previous_run_log {
        if previous.dag_hash.as_deref() != Some(dag_hash.as_str()) && !use_cached_force {
            return Err(EngineError::DagHashMismatch);
        }
    }

    let ctx = Arc::new(ExecutionContext::new(
        run_log_store,
        catalog_handler,
        secrets_handler,
        executor,
        run_id,
        tag,
        use_cached,
        use_cached_force,
        previous_run_log,
        dag_hash,
        base_dir,
    ));

    Ok(PreparedPipeline { ctx, graph })
}

/// Create and persist the fresh Run Log a traversal writes into, carrying
/// forward the previous run's parameters and catalog contents when resuming.
/// Grounded in `BaseExecutor.set_up_run_log`.
async fn set_up_run_log(ctx: &ExecutionContext, cmd_line_parameters: HashMap<String, Value>) -> Result<(), EngineError> {
    let mut run_log = ctx.run_log_store.create_run_log(&ctx.run_id).await?;
    run_log.tag = ctx.tag.clone();
    run_log.status = Status::Processing;
    run_log.dag_hash = Some(ctx.dag_hash.clone());

    let mut parameters = cmd_line_parameters;
    {
        let previous = ctx.previous_run_log.lock().await;
        if let Some(previous_run_log) = previous.as_ref() {
            run_log.original_run_id = Some(previous_run_log.run_id.clone());
            ctx.catalog_handler
                .sync_between_runs(&previous_run_log.run_id, &ctx.run_id)
                .await?;
            run_log.use_cached = true;
            parameters.extend(previous_run_log.parameters.clone());
        }
    }
    run_log.parameters = parameters;

    ctx.run_log_store.put_run_log(run_log).await?;
    Ok(())
}

/// Raise the pipeline's final status as an error if it ended in `FAIL`.
/// Skipped for rendering executors: a `DemoRenderer` traversal never
/// produces a real Run Log to inspect, matching `DemoRenderer`'s override of
/// `execute_graph` never calling `send_return_code` on a populated log.
async fn send_return_code(ctx: &ExecutionContext) -> Result<(), EngineError> {
    if ctx.executor.renders_only() {
        return Ok(());
    }
    let run_log = ctx.run_log_store.get_run_log_by_id(&ctx.run_id, false).await?;
    if run_log.status == Status::Fail {
        return Err(EngineError::PipelineFailed);
    }
    Ok(())
}

/// Make sure a Run Log exists for `ctx.run_id`, creating one with
/// `set_up_run_log` if this is a cold entry that never went through
/// `execute_pipeline`'s own bootstrap. Grounded in
/// `original_source/magnus/executor.py`'s
/// `LocalContainerExecutor.prepare_for_node_execution` ("Need to set up the
/// step log for the first node as the entry point is different"): a
/// container executor or external orchestrator re-entering
/// `execute_single_node`/`execute_single_branch` directly is a documented
/// use case, not just internal dispatch, so a missing run log here must be
/// created rather than surfaced as `RunLogNotFound`.
async fn ensure_run_log(ctx: &ExecutionContext) -> Result<(), EngineError> {
    match ctx.run_log_store.get_run_log_by_id(&ctx.run_id, false).await {
        Ok(_) => Ok(()),
        Err(runlog::RunLogError::RunLogNotFound(_)) => set_up_run_log(ctx, HashMap::new()).await,
        Err(e) => Err(e.into()),
    }
}

fn find_node_by_internal_name<'g>(graph: &'g Graph, internal_name: &str) -> Option<&'g Node> {
    if let Ok(node) = graph.get_node_by_internal_name(internal_name) {
        return Some(node);
    }
    for node in graph.nodes() {
        for (_, sub_graph) in node.branches() {
            if let Some(found) = find_node_by_internal_name(sub_graph, internal_name) {
                return Some(found);
            }
        }
    }
    None
}

fn find_branch_by_internal_name<'g>(graph: &'g Graph, internal_branch_name: &str) -> Option<&'g Graph> {
    if graph.internal_branch_name == internal_branch_name {
        return Some(graph);
    }
    for node in graph.nodes() {
        for (_, sub_graph) in node.branches() {
            if let Some(found) = find_branch_by_internal_name(sub_graph, internal_branch_name) {
                return Some(found);
            }
        }
    }
    None
}

/// Run an entire pipeline from its `start_at` node through to a terminal
/// node, optionally resuming a previous run.
#[allow(clippy::too_many_arguments)]
pub async fn execute_pipeline(
    pipeline_file: &Path,
    variables_file: Option<&Path>,
    configuration_file: Option<&Path>,
    run_id: Option<String>,
    tag: Option<String>,
    use_cached: bool,
    use_cached_force: bool,
    parameters: HashMap<String, Value>,
) -> Result<(), EngineError> {
    if (use_cached || use_cached_force) && run_id.is_none() {
        return Err(EngineError::InvalidComposite {
            name: "run_id".to_owned(),
            message: "resuming a cached run requires an explicit run id to resume from".to_owned(),
        });
    }

    let effective_run_id = generate_run_id(run_id);

    let prepared = prepare_configurations(
        pipeline_file,
        variables_file,
        configuration_file,
        effective_run_id,
        tag,
        use_cached,
        use_cached_force,
    )
    .await?;

    set_up_run_log(&prepared.ctx, parameters).await?;

    traversal::execute_graph(prepared.ctx.clone(), prepared.graph.clone(), MapVariable::new()).await?;

    send_return_code(&prepared.ctx).await
}

/// Execute exactly one node, addressed by its CLI-friendly command name.
/// A genuine cold invocation (the container executor, or an external
/// orchestrator re-entering a single node's work directly) is a documented
/// use case, so this self-heals a missing run log and a missing step log
/// rather than assuming `execute_pipeline` already created them.
pub async fn execute_single_node(
    pipeline_file: &Path,
    variables_file: Option<&Path>,
    configuration_file: Option<&Path>,
    run_id: String,
    tag: Option<String>,
    step_command_name: &str,
    map_variable: MapVariable,
) -> Result<(), EngineError> {
    let prepared = prepare_configurations(pipeline_file, variables_file, configuration_file, run_id, tag, false, false).await?;

    ensure_run_log(&prepared.ctx).await?;

    let internal_name = graph::naming::internal_name_from_command_name(step_command_name);
    let node = find_node_by_internal_name(&prepared.graph, &internal_name)
        .ok_or_else(|| EngineError::Graph(graph::GraphError::InternalNodeNotFound(internal_name.clone())))?
        .clone();

    let step_log_name = node.get_step_log_name(&map_variable);
    match prepared.ctx.run_log_store.get_step_log(&step_log_name, &prepared.ctx.run_id).await {
        Ok(_) => {}
        Err(runlog::RunLogError::StepLogNotFound(_)) => {
            // Mirrors `traversal::execute_from_graph`'s own step-log
            // bootstrap: a cold entry never went through that dispatcher, so
            // nothing else has created this node's step log yet.
            let mut step_log = prepared.ctx.run_log_store.create_step_log(&node.name, &step_log_name).await?;
            let code_identity = prepared.ctx.run_log_store.create_code_identity().await?;
            step_log.code_identities.push(code_identity);
            step_log.step_type = node.node_type().to_owned();
            step_log.status = Status::Processing;
            prepared.ctx.run_log_store.add_step_log(step_log, &prepared.ctx.run_id).await?;
        }
        Err(e) => return Err(e.into()),
    }

    traversal::execute_node(&prepared.ctx, &node, &map_variable).await?;

    send_return_code(&prepared.ctx).await
}

/// Execute one branch of the graph standalone — the entry point orchestrated
/// parallel/map modes dispatch each sibling branch through. Self-heals a
/// missing run log the same way `execute_single_node` does; the per-node
/// step logs inside the branch are created by `execute_graph`'s own
/// traversal, so no extra bootstrap is needed here.
pub async fn execute_single_branch(
    pipeline_file: &Path,
    variables_file: Option<&Path>,
    configuration_file: Option<&Path>,
    run_id: String,
    tag: Option<String>,
    branch_internal_name: &str,
    map_variable: MapVariable,
) -> Result<(), EngineError> {
    let prepared = prepare_configurations(pipeline_file, variables_file, configuration_file, run_id, tag, false, false).await?;

    ensure_run_log(&prepared.ctx).await?;

    let branch = find_branch_by_internal_name(&prepared.graph, branch_internal_name)
        .ok_or_else(|| EngineError::InvalidComposite {
            name: branch_internal_name.to_owned(),
            message: "no branch with this internal name exists in the graph".to_owned(),
        })?
        .clone();

    traversal::execute_graph(prepared.ctx.clone(), branch, map_variable).await?;

    send_return_code(&prepared.ctx).await
}
