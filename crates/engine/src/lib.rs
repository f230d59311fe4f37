//! `engine` crate — loads a pipeline document into a validated [`graph::Graph`]
//! and drives its traversal against a pluggable provider stack
//! (run log store, catalog handler, secrets handler, executor).

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod providers;
pub mod traversal;

#[cfg(test)]
mod pipeline_tests;
#[cfg(test)]
mod traversal_tests;

pub use config::{GraphBuilder, PipelineDocument};
pub use context::ExecutionContext;
pub use error::EngineError;
pub use executor::{ContainerExecutor, DemoRenderer, Executor, LocalExecutor};
pub use pipeline::{execute_pipeline, execute_single_branch, execute_single_node};
