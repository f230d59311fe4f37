//! `Executor` — the compute-mode seam. Grounded in
//! `original_source/magnus/executor.py`'s `BaseExecutor` subclasses
//! (`LocalExecutor`, `LocalContainerExecutor`, `DemoRenderer`): most of the
//! traversal logic lives in [`crate::traversal`] and never needs to be
//! touched by a new mode; only "how is a single node's work actually
//! carried out" varies.

use async_trait::async_trait;
use tokio::sync::Mutex;

use graph::{MapVariable, Node};

use crate::context::ExecutionContext;
use crate::error::EngineError;

#[async_trait]
pub trait Executor: Send + Sync {
    /// Whether sibling branches of a `parallel`/`map` node run concurrently.
    fn is_parallel_execution(&self) -> bool;

    /// Carry out a single non-composite node's work. Interactive modes
    /// (local, container) execute the node for real; rendering modes just
    /// record what they would have done.
    async fn trigger_job(
        &self,
        ctx: &ExecutionContext,
        node: &Node,
        map_variable: &MapVariable,
    ) -> Result<(), EngineError>;

    /// True for modes that only emit job specifications and never actually
    /// run anything — composite node expansion is unsupported in this mode,
    /// matching `DemoRenderer.execute_graph`'s explicit rejection of
    /// `parallel`/`map`/`dag` nodes.
    fn renders_only(&self) -> bool {
        false
    }
}

/// Runs every node directly in this process. The default, interactive mode.
pub struct LocalExecutor {
    enable_parallel: bool,
}

impl LocalExecutor {
    pub fn new(enable_parallel: bool) -> Self {
        Self { enable_parallel }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    fn is_parallel_execution(&self) -> bool {
        self.enable_parallel
    }

    async fn trigger_job(
        &self,
        ctx: &ExecutionContext,
        node: &Node,
        map_variable: &MapVariable,
    ) -> Result<(), EngineError> {
        crate::traversal::execute_node(ctx, node, map_variable).await
    }
}

/// Runs each node's command inside a container via `docker run`, keeping the
/// same host process as the orchestrator. A thin reference implementation
/// of `original_source/magnus/executor.py`'s `LocalContainerExecutor`: the
/// original spins up a long-lived container per node and streams its logs;
/// here we shell out to `docker run --rm` synchronously and surface its
/// exit code the same way `trigger_job` does for local mode.
pub struct ContainerExecutor {
    docker_image: String,
    enable_parallel: bool,
}

impl ContainerExecutor {
    pub fn new(docker_image: impl Into<String>, enable_parallel: bool) -> Self {
        Self {
            docker_image: docker_image.into(),
            enable_parallel,
        }
    }
}

#[async_trait]
impl Executor for ContainerExecutor {
    fn is_parallel_execution(&self) -> bool {
        self.enable_parallel
    }

    async fn trigger_job(
        &self,
        ctx: &ExecutionContext,
        node: &Node,
        map_variable: &MapVariable,
    ) -> Result<(), EngineError> {
        let command_name = node.command_friendly_name();
        let status = tokio::process::Command::new("docker")
            .args(["run", "--rm", "--network", "host"])
            .arg(&self.docker_image)
            .args([
                "execute-single-node",
                "--run-id",
                &ctx.run_id,
                "--node",
                &command_name,
            ])
            .status()
            .await
            .map_err(|e| EngineError::ExternalServiceFailure(format!("failed to spawn docker: {e}")))?;

        if !status.success() {
            let mut step_log = ctx
                .run_log_store
                .get_step_log(&node.get_step_log_name(map_variable), &ctx.run_id)
                .await?;
            step_log.status = runlog::Status::Fail;
            step_log.message = Some("node execution inside the container failed".to_owned());
            ctx.run_log_store.add_step_log(step_log, &ctx.run_id).await?;
        }
        Ok(())
    }
}

/// Renders a pipeline as a sequential bash script instead of running it.
/// Grounded in `DemoRenderer`: composite nodes are explicitly out of scope
/// (the rendered script has no way to express branching), and every
/// rendered node is addressed by its single-node CLI invocation so the
/// script can be run with any executor already configured.
pub struct DemoRenderer {
    lines: Mutex<Vec<String>>,
}

impl DemoRenderer {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    /// Flush the accumulated script to `demo-bash.sh` relative to `base_dir`.
    pub async fn write_script(&self, base_dir: &std::path::Path) -> std::io::Result<()> {
        let lines = self.lines.lock().await;
        tokio::fs::write(base_dir.join("demo-bash.sh"), lines.join("\n")).await
    }
}

impl Default for DemoRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for DemoRenderer {
    fn is_parallel_execution(&self) -> bool {
        false
    }

    fn renders_only(&self) -> bool {
        true
    }

    async fn trigger_job(
        &self,
        ctx: &ExecutionContext,
        node: &Node,
        _map_variable: &MapVariable,
    ) -> Result<(), EngineError> {
        let mut lines = self.lines.lock().await;

        // An `as-is` node never runs for real, even in interactive modes —
        // rendering emits its `render_string` verbatim instead of a
        // single-node re-entry line, per spec.md §4.2.
        if let graph::NodeKind::AsIs { render_string } = &node.kind {
            if let Some(rendered) = render_string {
                lines.push(rendered.clone());
            }
            return Ok(());
        }

        let command_name = node.command_friendly_name();
        lines.push(format!(
            "rat execute-single-node --run-id {} --node {}\nexit_code=$?\nif [ $exit_code -ne 0 ]; then exit 1; fi",
            ctx.run_id, command_name
        ));
        Ok(())
    }
}
