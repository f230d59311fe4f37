//! `nodes` crate — dispatches a task node's `command` according to its
//! `command_type`, and carries the in-process parameter exchange channel
//! the engine uses between attempts.

pub mod command;
pub mod error;
pub mod parameter_channel;

pub use command::{executor_for, CommandExecutor, CommandOutcome};
pub use error::NodeError;
pub use parameter_channel::ParameterChannel;
