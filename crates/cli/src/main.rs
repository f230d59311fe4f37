//! `rusty-automation-tool` CLI entry-point — the §6 CLI surface.
//!
//! Grounded in `original_source/magnus/pipeline.py`'s `execute`/
//! `execute_single_node`/`execute_single_brach` functions (the last one's
//! misspelling is a known typo in the source; the subcommand exposed here is
//! spelled correctly, see DESIGN.md). The click-based command-line wiring
//! itself wasn't part of the retrieved source; each subcommand here is a
//! thin wrapper around the matching `engine::pipeline` entry point instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::error;

use graph::MapVariable;

#[derive(Parser)]
#[command(
    name = "rusty-automation-tool",
    about = "DAG-based workflow orchestration engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a pipeline from its start node through to a terminal node.
    Execute {
        #[arg(long)]
        pipeline: PathBuf,
        #[arg(long)]
        variables: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long = "run-id")]
        run_id: Option<String>,
        #[arg(long = "use-cached")]
        use_cached: bool,
        #[arg(long = "use-cached-force")]
        use_cached_force: bool,
        /// Repeatable `name=value` parameter, available to the pipeline's
        /// first node as a run-log parameter.
        #[arg(long = "parameter", value_parser = parse_key_value)]
        parameters: Vec<(String, String)>,
    },
    /// Run exactly one node, addressed by its command-friendly internal
    /// name. Entry point used by the container executor and external
    /// orchestrators re-entering a single node's work.
    ExecuteSingleNode {
        #[arg(long)]
        pipeline: PathBuf,
        #[arg(long)]
        variables: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long = "run-id")]
        run_id: String,
        #[arg(long = "step-name")]
        step_name: String,
        /// Repeatable `name=value` map-iteration binding, passed through
        /// unchanged to `get_step_log_name`'s placeholder resolution.
        #[arg(long = "map-variable", value_parser = parse_key_value)]
        map_variable: Vec<(String, String)>,
    },
    /// Run exactly one branch of the graph standalone. Entry point an
    /// orchestrated `parallel`/`map` composite dispatches each sibling
    /// branch through.
    ExecuteSingleBranch {
        #[arg(long)]
        pipeline: PathBuf,
        #[arg(long)]
        variables: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long = "run-id")]
        run_id: String,
        #[arg(long = "branch-name")]
        branch_name: String,
        #[arg(long = "map-variable", value_parser = parse_key_value)]
        map_variable: Vec<(String, String)>,
    },
    /// Start the `api` crate's REST layer over the three entry points above —
    /// not part of §6's documented CLI surface, but the natural way to
    /// expose it for remote orchestrators (kept from the teacher's `serve`
    /// subcommand, re-pointed at the new handlers).
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected 'name=value', got '{raw}'"))
}

fn build_map_variable(pairs: Vec<(String, String)>) -> MapVariable {
    let mut mv = MapVariable::new();
    for (name, value) in pairs {
        mv.insert(name, value);
    }
    mv
}

fn build_parameters(pairs: Vec<(String, String)>) -> HashMap<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| {
            let value = serde_json::from_str(&v).unwrap_or(Value::String(v));
            (k, value)
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Command::Serve { bind } = cli.command {
        return match api::serve(&bind).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("{err}");
                ExitCode::FAILURE
            }
        };
    }

    let result = match cli.command {
        Command::Serve { .. } => unreachable!("handled above"),
        Command::Execute {
            pipeline,
            variables,
            config,
            tag,
            run_id,
            use_cached,
            use_cached_force,
            parameters,
        } => {
            engine::execute_pipeline(
                &pipeline,
                variables.as_deref(),
                config.as_deref(),
                run_id,
                tag,
                use_cached,
                use_cached_force,
                build_parameters(parameters),
            )
            .await
        }
        Command::ExecuteSingleNode {
            pipeline,
            variables,
            config,
            tag,
            run_id,
            step_name,
            map_variable,
        } => {
            engine::execute_single_node(
                &pipeline,
                variables.as_deref(),
                config.as_deref(),
                run_id,
                tag,
                &step_name,
                build_map_variable(map_variable),
            )
            .await
        }
        Command::ExecuteSingleBranch {
            pipeline,
            variables,
            config,
            tag,
            run_id,
            branch_name,
            map_variable,
        } => {
            engine::execute_single_branch(
                &pipeline,
                variables.as_deref(),
                config.as_deref(),
                run_id,
                tag,
                &branch_name,
                build_map_variable(map_variable),
            )
            .await
        }
    };

    // Exit code: 0 on Run Log SUCCESS, non-zero on FAIL or internal error —
    // `send_return_code` has already turned a FAIL run log into
    // `EngineError::PipelineFailed` by the time it gets here.
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
