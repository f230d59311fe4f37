//! Integration tests for the traversal core, exercising
//! `execute_graph`/`execute_node`/`is_eligible_for_rerun` against an
//! in-memory provider stack so no external services are required.
//!
//! Grounded in the teacher's `executor_tests.rs` (build a small graph
//! directly, run it, assert on the resulting log) generalized from its
//! `MockNode` fixture to real `task` nodes backed by `/bin/true`,
//! `/bin/false` and a tiny counter-backed shell script for the retry case.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use catalog::{CatalogHandler, FileSystemCatalog};
use graph::{CommandType, Graph, MapVariable, Node, NodeConfig, NodeKind};
use runlog::{InMemoryRunLogStore, RunLog, RunLogStore, Status, StepLog};
use secrets::{EnvSecretsHandler, SecretsHandler};

use crate::context::ExecutionContext;
use crate::executor::{Executor, LocalExecutor};
use crate::traversal;

fn unique_suffix() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos()
}

fn scratch_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("traversal-test-{label}-{}-{}", std::process::id(), unique_suffix()));
    dir
}

async fn new_context(run_id: &str, enable_parallel: bool) -> (Arc<ExecutionContext>, PathBuf) {
    let store: Arc<dyn RunLogStore> = Arc::new(InMemoryRunLogStore::new());
    store.put_run_log(RunLog::new(run_id)).await.unwrap();

    let scratch = scratch_dir(run_id);
    let catalog: Arc<dyn CatalogHandler> = Arc::new(FileSystemCatalog::new(
        scratch.join("catalog"),
        scratch.join("data").to_string_lossy().into_owned(),
    ));
    let secrets: Arc<dyn SecretsHandler> = Arc::new(EnvSecretsHandler::default());
    let executor: Arc<dyn Executor> = Arc::new(LocalExecutor::new(enable_parallel));

    let ctx = Arc::new(ExecutionContext::new(
        store,
        catalog,
        secrets,
        executor,
        run_id,
        None,
        false,
        false,
        None,
        "test-hash",
        scratch.clone(),
    ));
    (ctx, scratch)
}

/// Node naming follows `engine::config::GraphBuilder`'s real scheme: a
/// root-level node's internal name is its plain name, a branch's is its
/// owning node's internal name with the branch segment appended.
fn node(name: &str, internal_branch_name: &str, config: NodeConfig, kind: NodeKind) -> Node {
    let internal_name = if internal_branch_name.is_empty() {
        name.to_owned()
    } else {
        format!("{internal_branch_name}.{name}")
    };
    Node::new(name, internal_name, internal_branch_name, config, kind).unwrap()
}

fn task_config(command: &str, next: Option<&str>, on_failure: Option<&str>, retry: Option<u32>) -> NodeConfig {
    NodeConfig {
        command: Some(command.to_owned()),
        command_type: Some(CommandType::Shell),
        next: next.map(str::to_owned),
        on_failure: on_failure.map(str::to_owned),
        retry,
        ..Default::default()
    }
}

/// Creates and persists the `Processing` step log `execute_from_graph` would
/// have created before handing off to `execute_node`/the resume gate.
async fn seed_step_log(ctx: &ExecutionContext, node: &Node) {
    let mut step_log = StepLog::new(&node.internal_name, node.node_type());
    step_log.status = Status::Processing;
    ctx.run_log_store.add_step_log(step_log, &ctx.run_id).await.unwrap();
}

// ---------------------------------------------------------------------------
// 1. Linear happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn linear_happy_path_reaches_success() {
    let (ctx, scratch) = new_context("run-linear", false).await;

    let mut graph = Graph::new("", "start", None, None);
    graph
        .add_node(node("start", "", task_config("true", Some("success"), None, None), NodeKind::Task))
        .unwrap();
    graph.add_node(node("success", "", NodeConfig::default(), NodeKind::Success)).unwrap();
    graph.add_node(node("fail", "", NodeConfig::default(), NodeKind::Fail)).unwrap();
    graph.validate().unwrap();

    traversal::execute_graph(ctx.clone(), graph, MapVariable::new()).await.unwrap();

    let run_log = ctx.run_log_store.get_run_log_by_id("run-linear", true).await.unwrap();
    assert_eq!(run_log.status, Status::Success);

    let start_step = run_log.steps.get("start").unwrap();
    assert_eq!(start_step.status, Status::Success);
    assert_eq!(start_step.attempts.len(), 1);

    std::fs::remove_dir_all(&scratch).ok();
}

// ---------------------------------------------------------------------------
// 2. Retry-then-succeed
// ---------------------------------------------------------------------------

const FLAKY_SCRIPT: &str = "#!/bin/bash\n\
counter_file=\"$1\"\n\
count=0\n\
if [ -f \"$counter_file\" ]; then\n\
  count=$(cat \"$counter_file\")\n\
fi\n\
count=$((count + 1))\n\
echo \"$count\" > \"$counter_file\"\n\
if [ \"$count\" -lt 3 ]; then\n\
  exit 1\n\
fi\n\
exit 0\n";

#[cfg(unix)]
fn make_executable(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

#[tokio::test]
async fn retry_then_succeed_executes_the_retry_loop() {
    let (ctx, scratch) = new_context("run-retry", false).await;
    std::fs::create_dir_all(&scratch).unwrap();

    let script = scratch.join("flaky.sh");
    let counter = scratch.join("attempts.count");
    std::fs::write(&script, FLAKY_SCRIPT).unwrap();
    make_executable(&script);

    let command = format!("bash {} {}", script.display(), counter.display());
    let flaky = node("flaky", "", task_config(&command, Some("success"), None, Some(3)), NodeKind::Task);

    seed_step_log(&ctx, &flaky).await;
    traversal::execute_node(&ctx, &flaky, &MapVariable::new()).await.unwrap();

    let step = ctx.run_log_store.get_step_log("flaky", "run-retry").await.unwrap();
    assert_eq!(step.status, Status::Success);
    assert_eq!(step.attempts.len(), 3);
    assert_eq!(step.attempts[0].status, Status::Fail);
    assert_eq!(step.attempts[1].status, Status::Fail);
    assert_eq!(step.attempts[2].status, Status::Success);

    std::fs::remove_dir_all(&scratch).ok();
}

#[tokio::test]
async fn retries_never_exceed_max_attempts() {
    let (ctx, scratch) = new_context("run-retry-exhausted", false).await;

    let boom = node("boom", "", task_config("false", Some("success"), None, Some(2)), NodeKind::Task);
    seed_step_log(&ctx, &boom).await;
    traversal::execute_node(&ctx, &boom, &MapVariable::new()).await.unwrap();

    let step = ctx.run_log_store.get_step_log("boom", "run-retry-exhausted").await.unwrap();
    assert_eq!(step.status, Status::Fail);
    assert_eq!(step.attempts.len(), 2);

    std::fs::remove_dir_all(&scratch).ok();
}

// ---------------------------------------------------------------------------
// 3. Terminal failure routes through on_failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_routes_through_on_failure_before_the_fail_node() {
    let (ctx, scratch) = new_context("run-onfailure", false).await;

    let mut graph = Graph::new("", "start", None, None);
    graph
        .add_node(node(
            "start",
            "",
            task_config("false", Some("success"), Some("cleanup"), None),
            NodeKind::Task,
        ))
        .unwrap();
    graph
        .add_node(node("cleanup", "", task_config("true", Some("fail"), None, None), NodeKind::Task))
        .unwrap();
    graph.add_node(node("success", "", NodeConfig::default(), NodeKind::Success)).unwrap();
    graph.add_node(node("fail", "", NodeConfig::default(), NodeKind::Fail)).unwrap();
    graph.validate().unwrap();

    traversal::execute_graph(ctx.clone(), graph, MapVariable::new()).await.unwrap();

    let run_log = ctx.run_log_store.get_run_log_by_id("run-onfailure", true).await.unwrap();
    assert_eq!(run_log.status, Status::Fail);

    let start_step = run_log.steps.get("start").unwrap();
    assert_eq!(start_step.status, Status::Fail);

    let cleanup_step = run_log.steps.get("cleanup").unwrap();
    assert_eq!(cleanup_step.status, Status::Success, "on_failure target still ran");

    std::fs::remove_dir_all(&scratch).ok();
}

// ---------------------------------------------------------------------------
// 4. Parallel fan-out, one branch fails
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parallel_fan_out_one_branch_failing_fails_the_whole_step() {
    let (ctx, scratch) = new_context("run-parallel", true).await;

    let mut branch_a = Graph::new("fanout.branch_a", "task_a", None, None);
    branch_a
        .add_node(node(
            "task_a",
            "fanout.branch_a",
            task_config("true", Some("done_a"), None, None),
            NodeKind::Task,
        ))
        .unwrap();
    branch_a
        .add_node(node("done_a", "fanout.branch_a", NodeConfig::default(), NodeKind::Success))
        .unwrap();
    branch_a
        .add_node(node("failed_a", "fanout.branch_a", NodeConfig::default(), NodeKind::Fail))
        .unwrap();

    let mut branch_b = Graph::new("fanout.branch_b", "task_b", None, None);
    branch_b
        .add_node(node(
            "task_b",
            "fanout.branch_b",
            task_config("false", Some("done_b"), Some("failed_b"), None),
            NodeKind::Task,
        ))
        .unwrap();
    branch_b
        .add_node(node("done_b", "fanout.branch_b", NodeConfig::default(), NodeKind::Success))
        .unwrap();
    branch_b
        .add_node(node("failed_b", "fanout.branch_b", NodeConfig::default(), NodeKind::Fail))
        .unwrap();

    let mut root = Graph::new("", "fanout", None, None);
    root.add_node(node(
        "fanout",
        "",
        NodeConfig {
            next: Some("success".to_owned()),
            ..Default::default()
        },
        NodeKind::Parallel {
            branches: vec![
                ("fanout.branch_a".to_owned(), branch_a),
                ("fanout.branch_b".to_owned(), branch_b),
            ],
        },
    ))
    .unwrap();
    root.add_node(node("success", "", NodeConfig::default(), NodeKind::Success)).unwrap();
    root.add_node(node("fail", "", NodeConfig::default(), NodeKind::Fail)).unwrap();
    root.validate().unwrap();

    traversal::execute_graph(ctx.clone(), root, MapVariable::new()).await.unwrap();

    let run_log = ctx.run_log_store.get_run_log_by_id("run-parallel", true).await.unwrap();
    assert_eq!(run_log.status, Status::Fail);

    let fanout_step = run_log.steps.get("fanout").unwrap();
    assert_eq!(fanout_step.status, Status::Fail);

    let branch_a_log = ctx.run_log_store.get_branch_log("fanout.branch_a", "run-parallel").await.unwrap();
    assert_eq!(branch_a_log.status(), Status::Success);
    let branch_b_log = ctx.run_log_store.get_branch_log("fanout.branch_b", "run-parallel").await.unwrap();
    assert_eq!(branch_b_log.status(), Status::Fail);

    std::fs::remove_dir_all(&scratch).ok();
}

// ---------------------------------------------------------------------------
// 5. Map over a list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn map_over_a_list_runs_one_branch_per_value() {
    let (ctx, scratch) = new_context("run-map", false).await;
    ctx.run_log_store
        .set_parameters(
            "run-map",
            HashMap::from([("items".to_owned(), serde_json::json!(["a", "b", "c"]))]),
        )
        .await
        .unwrap();

    let mut branch = Graph::new("mapstep.%", "do_it", None, None);
    branch
        .add_node(node("do_it", "mapstep.%", task_config("true", Some("done"), None, None), NodeKind::Task))
        .unwrap();
    branch.add_node(node("done", "mapstep.%", NodeConfig::default(), NodeKind::Success)).unwrap();
    branch.add_node(node("failed", "mapstep.%", NodeConfig::default(), NodeKind::Fail)).unwrap();

    let mut root = Graph::new("", "mapstep", None, None);
    root.add_node(node(
        "mapstep",
        "",
        NodeConfig {
            next: Some("success".to_owned()),
            ..Default::default()
        },
        NodeKind::Map {
            iterate_on: "items".to_owned(),
            iterate_as: "item".to_owned(),
            branch: Box::new(branch),
        },
    ))
    .unwrap();
    root.add_node(node("success", "", NodeConfig::default(), NodeKind::Success)).unwrap();
    root.add_node(node("fail", "", NodeConfig::default(), NodeKind::Fail)).unwrap();
    root.validate().unwrap();

    traversal::execute_graph(ctx.clone(), root, MapVariable::new()).await.unwrap();

    let run_log = ctx.run_log_store.get_run_log_by_id("run-map", true).await.unwrap();
    assert_eq!(run_log.status, Status::Success);

    for value in ["a", "b", "c"] {
        let branch_log = ctx
            .run_log_store
            .get_branch_log(&format!("mapstep.{value}"), "run-map")
            .await
            .unwrap();
        assert_eq!(branch_log.status(), Status::Success);
    }

    std::fs::remove_dir_all(&scratch).ok();
}

// ---------------------------------------------------------------------------
// 6. Resume with partial success
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_skips_steps_that_already_succeeded() {
    let mut previous = RunLog::new("run-1");
    let mut start_step = StepLog::new("start", "task");
    start_step.status = Status::Success;
    previous.steps.insert("start".to_owned(), start_step);

    let store: Arc<dyn RunLogStore> = Arc::new(InMemoryRunLogStore::new());
    store.put_run_log(RunLog::new("run-2")).await.unwrap();

    let scratch = scratch_dir("resume");
    let catalog: Arc<dyn CatalogHandler> = Arc::new(FileSystemCatalog::new(
        scratch.join("catalog"),
        scratch.join("data").to_string_lossy().into_owned(),
    ));
    let secrets: Arc<dyn SecretsHandler> = Arc::new(EnvSecretsHandler::default());
    let executor: Arc<dyn Executor> = Arc::new(LocalExecutor::new(false));

    let ctx = Arc::new(ExecutionContext::new(
        store,
        catalog,
        secrets,
        executor,
        "run-2",
        None,
        true,
        false,
        Some(previous),
        "test-hash",
        scratch.clone(),
    ));

    let mut graph = Graph::new("", "start", None, None);
    // "start"'s command would fail if it ran for real — it must not, since
    // the previous run already succeeded it.
    graph
        .add_node(node("start", "", task_config("false", Some("after"), None, None), NodeKind::Task))
        .unwrap();
    graph
        .add_node(node("after", "", task_config("true", Some("success"), None, None), NodeKind::Task))
        .unwrap();
    graph.add_node(node("success", "", NodeConfig::default(), NodeKind::Success)).unwrap();
    graph.add_node(node("fail", "", NodeConfig::default(), NodeKind::Fail)).unwrap();
    graph.validate().unwrap();

    traversal::execute_graph(ctx.clone(), graph, MapVariable::new()).await.unwrap();

    let run_log = ctx.run_log_store.get_run_log_by_id("run-2", true).await.unwrap();
    assert_eq!(run_log.status, Status::Success);

    let start_step = run_log.steps.get("start").unwrap();
    assert!(start_step.mock, "a resumed, already-succeeded step is marked mock");
    assert_eq!(start_step.status, Status::Success);
    assert!(start_step.attempts.is_empty(), "a skipped step never attempts execution");

    let after_step = run_log.steps.get("after").unwrap();
    assert_eq!(after_step.status, Status::Success);
    assert_eq!(after_step.attempts.len(), 1);

    assert!(
        ctx.is_attached_to_cache().await,
        "a resume with no diverging step stays attached to the cache throughout"
    );

    std::fs::remove_dir_all(&scratch).ok();
}

#[tokio::test]
async fn resume_detaches_from_cache_permanently_once_a_step_diverges() {
    let mut previous = RunLog::new("run-1");
    let mut start_step = StepLog::new("start", "task");
    start_step.status = Status::Fail; // previous run never finished this step
    previous.steps.insert("start".to_owned(), start_step);

    let (ctx, scratch) = new_context("run-diverge", false).await;
    *ctx.previous_run_log.lock().await = Some(previous);
    assert!(ctx.is_attached_to_cache().await);

    let start = node("start", "", task_config("true", Some("success"), None, None), NodeKind::Task);
    seed_step_log(&ctx, &start).await;

    let eligible = traversal::is_eligible_for_rerun(&ctx, &start, &MapVariable::new()).await.unwrap();
    assert!(eligible, "a step that didn't succeed previously must run for real");
    assert!(
        !ctx.is_attached_to_cache().await,
        "a diverging step permanently detaches the rest of the run from the cache"
    );

    std::fs::remove_dir_all(&scratch).ok();
}
