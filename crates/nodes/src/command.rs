//! `CommandExecutor` — runs a task node's `command` per its `command_type`.
//!
//! Grounded in `original_source/magnus/nodes.py`'s `PythonExecutionType` and
//! `ShellExecutionType`, generalized to Rust's process model.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;

use graph::MapVariable;

use crate::error::NodeError;

/// What a single command invocation did.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    /// The command exited cleanly. `set_parameters` holds any mapping the
    /// command returned (python) — always empty for shell commands, which
    /// have no structured return channel.
    Success { set_parameters: HashMap<String, Value> },
    Failure { message: String },
}

/// Dispatches a task node's command. One implementation per
/// `graph::CommandType` variant.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(
        &self,
        command: &str,
        parameters: &HashMap<String, Value>,
        map_variable: &MapVariable,
    ) -> Result<CommandOutcome, NodeError>;
}

/// Returns the executor for a given command type.
pub fn executor_for(command_type: graph::CommandType) -> Box<dyn CommandExecutor> {
    match command_type {
        graph::CommandType::Shell => Box::new(ShellCommandExecutor),
        graph::CommandType::Python => Box::new(PythonCommandExecutor),
    }
}

/// Runs `command` as a subprocess, split on whitespace — deliberately not
/// `sh -c "..."`, matching the original's `command.split()` to avoid a
/// shell-injection-prone invocation.
pub struct ShellCommandExecutor;

#[async_trait]
impl CommandExecutor for ShellCommandExecutor {
    async fn run(
        &self,
        command: &str,
        parameters: &HashMap<String, Value>,
        map_variable: &MapVariable,
    ) -> Result<CommandOutcome, NodeError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| NodeError::MalformedCommand(command.to_owned()))?;
        let args: Vec<&str> = parts.collect();

        let mut cmd = TokioCommand::new(program);
        cmd.args(&args);
        for (k, v) in crate::parameter_channel::ParameterChannel::env_vars(parameters) {
            cmd.env(k, v);
        }
        for (name, value) in map_variable.iter() {
            cmd.env(format!("{}{}", crate::parameter_channel::PARAM_ENV_PREFIX, name.to_uppercase()), value);
        }

        let output = cmd
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| NodeError::SpawnFailed {
                command: command.to_owned(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(CommandOutcome::Success {
                set_parameters: HashMap::new(),
            })
        } else {
            let code = output.status.code().unwrap_or(-1);
            let message = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(NodeError::CommandFailed {
                command: command.to_owned(),
                code,
                message,
            })
        }
    }
}

/// Shells out to `python3` with an inline shim that imports `module.func`,
/// filters the supplied parameters (plus the current map variable, if its
/// name matches a parameter) down to the callee's signature, and returns
/// its JSON-encoded result on stdout.
///
/// Rust has no in-process equivalent of the original's `importlib` dispatch,
/// so the signature introspection the spec asks for is delegated to this
/// small shim rather than reimplemented — see DESIGN.md's Open Question log.
pub struct PythonCommandExecutor;

const SHIM: &str = r#"
import importlib, inspect, json, sys

def _main():
    payload = json.loads(sys.stdin.read() or "{}")
    module = importlib.import_module("__MODULE__")
    func = getattr(module, "__FUNC__")
    sig = inspect.signature(func)
    kwargs = {k: v for k, v in payload.items() if k in sig.parameters}
    result = func(**kwargs)
    sys.stdout.write(json.dumps(result) if result is not None else "null")

_main()
"#;

#[async_trait]
impl CommandExecutor for PythonCommandExecutor {
    async fn run(
        &self,
        command: &str,
        parameters: &HashMap<String, Value>,
        map_variable: &MapVariable,
    ) -> Result<CommandOutcome, NodeError> {
        let (module, func) = command
            .rsplit_once('.')
            .ok_or_else(|| NodeError::MalformedCommand(command.to_owned()))?;

        let script = SHIM.replace("__MODULE__", module).replace("__FUNC__", func);

        let mut payload: HashMap<String, Value> = parameters.clone();
        for (name, value) in map_variable.iter() {
            payload.insert(name.to_owned(), Value::String(value.to_owned()));
        }
        let stdin_payload = serde_json::to_vec(&payload)
            .map_err(|e| NodeError::PythonInvocation(format!("failed to encode parameters: {e}")))?;

        let mut child = TokioCommand::new("python3")
            .arg("-c")
            .arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| NodeError::SpawnFailed {
                command: command.to_owned(),
                message: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&stdin_payload)
                .await
                .map_err(|e| NodeError::PythonInvocation(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| NodeError::PythonInvocation(e.to_string()))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let message = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            return Err(NodeError::CommandFailed {
                command: command.to_owned(),
                code,
                message,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let result: Value = serde_json::from_str(stdout.trim())
            .map_err(|e| NodeError::PythonInvocation(format!("invalid JSON result: {e}")))?;

        let set_parameters = match result {
            Value::Null => HashMap::new(),
            Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(NodeError::PythonInvocation(format!(
                    "python function must return a mapping or None, got: {other}"
                )))
            }
        };

        Ok(CommandOutcome::Success { set_parameters })
    }
}
