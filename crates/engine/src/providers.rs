//! Builds the four provider trait objects an [`crate::context::ExecutionContext`]
//! needs from a pipeline document's optional `run_log`/`catalog`/`secrets`/`mode`
//! blocks.
//!
//! Grounded in `original_source/magnus/pipeline.py`'s `prepare_configurations`,
//! which resolves each provider block's `type` against a registry and
//! constructs the matching class with its `config` mapping as kwargs. We have
//! no runtime registry (see DESIGN.md's Open Question on polymorphism), so
//! each `provider_type` string is matched explicitly here instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog::{CatalogHandler, FileSystemCatalog};
use runlog::{InMemoryRunLogStore, JsonFileRunLogStore, RunLogStore};
use secrets::{EnvSecretsHandler, SecretsHandler};

use crate::config::ProviderConfig;
use crate::error::EngineError;
use crate::executor::{ContainerExecutor, DemoRenderer, Executor, LocalExecutor};

fn config_str(config: &ProviderConfig, key: &str) -> Option<String> {
    config.config.get(key).and_then(|v| v.as_str()).map(str::to_owned)
}

fn config_bool(config: &ProviderConfig, key: &str, default: bool) -> bool {
    config.config.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub fn build_run_log_store(
    config: Option<&ProviderConfig>,
    base_dir: &Path,
) -> Result<Arc<dyn RunLogStore>, EngineError> {
    let store: Arc<dyn RunLogStore> = match config.map(|c| c.provider_type.as_str()) {
        None | Some("") | Some("memory") | Some("in-memory") => Arc::new(InMemoryRunLogStore::new()),
        Some("file") | Some("json-file") => {
            let root = config
                .and_then(|c| config_str(c, "log_folder"))
                .map(PathBuf::from)
                .unwrap_or_else(|| base_dir.join(runlog::json_file::default_root()));
            Arc::new(JsonFileRunLogStore::new(root))
        }
        Some(other) => {
            return Err(EngineError::InvalidComposite {
                name: "run_log".to_owned(),
                message: format!("unknown run log provider type '{other}'"),
            })
        }
    };
    Ok(store)
}

pub fn build_catalog_handler(
    config: Option<&ProviderConfig>,
    base_dir: &Path,
) -> Result<Arc<dyn CatalogHandler>, EngineError> {
    let provider_type = config.map(|c| c.provider_type.as_str()).unwrap_or("file");
    match provider_type {
        "" | "file" | "local" => {
            let catalog_root = config
                .and_then(|c| config_str(c, "catalog_location"))
                .map(PathBuf::from)
                .unwrap_or_else(|| base_dir.join(".catalog"));
            let compute_data_folder = config
                .and_then(|c| config_str(c, "compute_data_folder"))
                .unwrap_or_else(|| "data".to_owned());
            Ok(Arc::new(FileSystemCatalog::new(catalog_root, compute_data_folder)))
        }
        other => Err(EngineError::InvalidComposite {
            name: "catalog".to_owned(),
            message: format!("unknown catalog provider type '{other}'"),
        }),
    }
}

pub fn build_secrets_handler(config: Option<&ProviderConfig>) -> Result<Arc<dyn SecretsHandler>, EngineError> {
    let provider_type = config.map(|c| c.provider_type.as_str()).unwrap_or("env");
    match provider_type {
        "" | "env" | "environment" => {
            let prefix = config
                .and_then(|c| config_str(c, "prefix"))
                .unwrap_or_else(|| "RAT_SECRET_".to_owned());
            Ok(Arc::new(EnvSecretsHandler::new(prefix)))
        }
        other => Err(EngineError::InvalidComposite {
            name: "secrets".to_owned(),
            message: format!("unknown secrets provider type '{other}'"),
        }),
    }
}

pub fn build_executor(config: Option<&ProviderConfig>) -> Result<Arc<dyn Executor>, EngineError> {
    let provider_type = config.map(|c| c.provider_type.as_str()).unwrap_or("local");
    let executor: Arc<dyn Executor> = match provider_type {
        "" | "local" => {
            let enable_parallel = config.map(|c| config_bool(c, "enable_parallel", false)).unwrap_or(false);
            Arc::new(LocalExecutor::new(enable_parallel))
        }
        "container" | "local-container" => {
            let image = config
                .and_then(|c| config_str(c, "docker_image"))
                .ok_or_else(|| EngineError::InvalidComposite {
                    name: "mode".to_owned(),
                    message: "container executor requires 'docker_image'".to_owned(),
                })?;
            let enable_parallel = config.map(|c| config_bool(c, "enable_parallel", false)).unwrap_or(false);
            Arc::new(ContainerExecutor::new(image, enable_parallel))
        }
        "demo-renderer" | "render" => Arc::new(DemoRenderer::new()),
        other => {
            return Err(EngineError::InvalidComposite {
                name: "mode".to_owned(),
                message: format!("unknown executor mode '{other}'"),
            })
        }
    };
    Ok(executor)
}
