//! Integration tests for the `execute_pipeline` entry point: loading a YAML
//! pipeline document end to end, and the resume-time `dag_hash` guard.
//!
//! Grounded in the teacher's `executor_tests.rs` style of driving the public
//! entry points directly rather than their internals, generalized here to
//! round-trip through a real file on disk since this crate's surface is a
//! file, not an in-memory `Workflow` value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use graph::MapVariable;
use runlog::{JsonFileRunLogStore, RunLogStore, Status};

use crate::error::EngineError;
use crate::pipeline::{execute_pipeline, execute_single_branch, execute_single_node};

fn unique_suffix() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos()
}

fn scratch_dir(label: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("pipeline-test-{label}-{}-{}", std::process::id(), unique_suffix()));
    dir
}

fn write_pipeline(dir: &Path, log_folder: &Path, start_command: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let yaml = format!(
        "dag:\n\
         \x20 start_at: start\n\
         \x20 steps:\n\
         \x20   start:\n\
         \x20     type: task\n\
         \x20     command: \"{start_command}\"\n\
         \x20     command_type: shell\n\
         \x20     next: success\n\
         \x20     on_failure: fail\n\
         \x20   success:\n\
         \x20     type: success\n\
         \x20   fail:\n\
         \x20     type: fail\n\
         run_log:\n\
         \x20 type: json-file\n\
         \x20 config:\n\
         \x20   log_folder: \"{log_folder}\"\n",
        start_command = start_command,
        log_folder = log_folder.display(),
    );
    let path = dir.join("pipeline.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[tokio::test]
async fn end_to_end_pipeline_reaches_success_through_the_yaml_surface() {
    let dir = scratch_dir("happy");
    let log_folder = dir.join("logs");
    let pipeline_file = write_pipeline(&dir, &log_folder, "true");

    execute_pipeline(
        &pipeline_file,
        None,
        None,
        Some("run-e2e".to_owned()),
        None,
        false,
        false,
        HashMap::new(),
    )
    .await
    .unwrap();

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn dag_hash_mismatch_is_rejected_on_resume() {
    let dir = scratch_dir("hash-mismatch");
    let log_folder = dir.join("logs");
    let pipeline_file = write_pipeline(&dir, &log_folder, "true");

    execute_pipeline(
        &pipeline_file,
        None,
        None,
        Some("run-resume".to_owned()),
        None,
        false,
        false,
        HashMap::new(),
    )
    .await
    .unwrap();

    // Change the dag's shape: the start node's command differs, so its
    // dag_hash no longer matches the one persisted with "run-resume".
    write_pipeline(&dir, &log_folder, "false");

    let result = execute_pipeline(
        &pipeline_file,
        None,
        None,
        Some("run-resume".to_owned()),
        None,
        true,
        false,
        HashMap::new(),
    )
    .await;

    assert!(matches!(result, Err(EngineError::DagHashMismatch)));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn use_cached_force_bypasses_the_dag_hash_check() {
    let dir = scratch_dir("hash-force");
    let log_folder = dir.join("logs");
    let pipeline_file = write_pipeline(&dir, &log_folder, "true");

    execute_pipeline(
        &pipeline_file,
        None,
        None,
        Some("run-force".to_owned()),
        None,
        false,
        false,
        HashMap::new(),
    )
    .await
    .unwrap();

    write_pipeline(&dir, &log_folder, "false");

    let result = execute_pipeline(
        &pipeline_file,
        None,
        None,
        Some("run-force".to_owned()),
        None,
        true,
        true,
        HashMap::new(),
    )
    .await;

    // The forced resume skips the dag_hash gate entirely and actually runs
    // the new (failing) dag, so it fails for a different reason than the
    // hash mismatch the unforced case rejects with.
    assert!(matches!(result, Err(EngineError::PipelineFailed)));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn resuming_without_a_run_id_is_rejected() {
    let dir = scratch_dir("no-run-id");
    let log_folder = dir.join("logs");
    let pipeline_file = write_pipeline(&dir, &log_folder, "true");

    let result = execute_pipeline(&pipeline_file, None, None, None, None, true, false, HashMap::new()).await;
    assert!(result.is_err());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn execute_single_node_cold_starts_a_missing_run_log_and_step_log() {
    // A genuine cold invocation: nothing ever called `execute_pipeline` for
    // this run_id, matching a container executor or external orchestrator
    // re-entering this one node directly.
    let dir = scratch_dir("cold-node");
    let log_folder = dir.join("logs");
    let pipeline_file = write_pipeline(&dir, &log_folder, "true");

    execute_single_node(
        &pipeline_file,
        None,
        None,
        "run-cold-node".to_owned(),
        None,
        "start",
        MapVariable::new(),
    )
    .await
    .unwrap();

    let store = JsonFileRunLogStore::new(&log_folder);
    let run_log = store.get_run_log_by_id("run-cold-node", true).await.unwrap();
    let step = run_log
        .steps
        .get("start")
        .expect("cold execute_single_node should have bootstrapped the step log, not just assumed it");
    assert_eq!(step.status, Status::Success);
    assert_eq!(step.attempts.len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn execute_single_branch_cold_starts_a_missing_run_log() {
    // Same cold-entry scenario as above, driven through the branch re-entry
    // point instead. Addressing the root branch ("") exercises the missing
    // run log path without needing a composite node's branch log to already
    // exist — that bootstrap belongs to the parent's own expansion, not to
    // this entry point.
    let dir = scratch_dir("cold-branch");
    let log_folder = dir.join("logs");
    let pipeline_file = write_pipeline(&dir, &log_folder, "true");

    execute_single_branch(
        &pipeline_file,
        None,
        None,
        "run-cold-branch".to_owned(),
        None,
        "",
        MapVariable::new(),
    )
    .await
    .unwrap();

    let store = JsonFileRunLogStore::new(&log_folder);
    let run_log = store.get_run_log_by_id("run-cold-branch", true).await.unwrap();
    assert_eq!(run_log.status, Status::Success);

    std::fs::remove_dir_all(&dir).ok();
}
