//! Command-execution error type.

use thiserror::Error;

/// Errors that can occur while running a task node's command.
///
/// Unlike the teacher's `NodeError`, this has no retryable/fatal split: the
/// engine's retry loop (`execute_node`) treats every command failure the
/// same way and counts attempts uniformly, per the uniform retry-until-
/// exhausted contract in the spec.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("command '{command}' exited with status {code}: {message}")]
    CommandFailed {
        command: String,
        code: i32,
        message: String,
    },

    #[error("failed to spawn command '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("python invocation failed: {0}")]
    PythonInvocation(String),

    #[error("malformed command '{0}': command_type requires a non-empty command string")]
    MalformedCommand(String),
}
