//! Pipeline document loading: YAML parsing, `{{variable}}` substitution,
//! and graph construction from the parsed `dag` block.
//!
//! Grounded in `original_source/magnus/pipeline.py`'s `prepare_configurations`
//! (variable substitution then handing the parsed `dag` block to a graph
//! builder; the builder module itself wasn't part of the retrieved source
//! set, so its node-by-node construction here follows `graph::Graph`'s own
//! shape instead). Out of scope for the core per §1, but the crate as a
//! whole still needs to turn a YAML file on disk into a `graph::Graph` to be
//! runnable end to end.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use graph::{CatalogSettings, CommandType, Graph, Node, NodeConfig, NodeKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Graph(#[from] graph::GraphError),

    #[error("pipeline document is missing required key '{0}'")]
    MissingKey(String),

    #[error("invalid node '{name}': {message}")]
    InvalidNode { name: String, message: String },
}

// ---------------------------------------------------------------------------
// Ordered YAML mappings — construction order matters for deterministic
// parallel-branch declaration order (§4.2).
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Vis<V>(std::marker::PhantomData<V>);

        impl<'de, V: Deserialize<'de>> serde::de::Visitor<'de> for Vis<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(Vis(std::marker::PhantomData))
    }
}

// ---------------------------------------------------------------------------
// Document shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDocument {
    pub dag: DagDoc,
    #[serde(default)]
    pub run_log: Option<ProviderConfig>,
    #[serde(default)]
    pub catalog: Option<ProviderConfig>,
    #[serde(default)]
    pub secrets: Option<ProviderConfig>,
    #[serde(default)]
    pub mode: Option<ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DagDoc {
    pub start_at: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_time: Option<u64>,
    pub steps: OrderedMap<StepDoc>,
}

/// `{ dag: DagDoc }` — the shape of a file referenced by a `dag` node's
/// `dag_definition`.
#[derive(Debug, Clone, Deserialize)]
pub struct DagDefinitionFile {
    pub dag: DagDoc,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type", default)]
    pub provider_type: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepDoc {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub command_type: Option<CommandType>,
    #[serde(default)]
    pub retry: Option<u32>,
    #[serde(default)]
    pub catalog: Option<CatalogSettings>,
    #[serde(default)]
    pub mode_config: Value,
    #[serde(default)]
    pub branches: Option<OrderedMap<DagDoc>>,
    #[serde(default)]
    pub iterate_on: Option<String>,
    #[serde(default)]
    pub iterate_as: Option<String>,
    #[serde(default)]
    pub branch: Option<Box<DagDoc>>,
    #[serde(default)]
    pub dag_definition: Option<String>,
    #[serde(default)]
    pub render_string: Option<String>,
}

// ---------------------------------------------------------------------------
// Variable substitution
// ---------------------------------------------------------------------------

/// Replace every `{{name}}` placeholder in `content` with the stringified
/// value of `variables[name]`, left untouched if the name is absent.
/// Grounded in the `apply_variables` call site in
/// `original_source/magnus/pipeline.py` (the substitution body itself was
/// not part of the extracted file set, so this is a straightforward
/// regex-based implementation, as SPEC_FULL.md's §6 notes call for).
pub fn apply_variables(content: &str, variables: &HashMap<String, Value>) -> String {
    let re = Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("static regex is valid");
    re.replace_all(content, |caps: &regex::Captures| {
        let name = &caps[1];
        match variables.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_owned(),
        }
    })
    .into_owned()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Load a pipeline document, substitute variables, and compute the
/// `dag_hash` over its `dag` block (ahead of the typed parse, so unrelated
/// top-level keys never influence the hash).
pub fn load_pipeline_document(
    path: &Path,
    variables: &HashMap<String, Value>,
) -> Result<(PipelineDocument, String), ConfigError> {
    let raw = read_file(path)?;
    let substituted = apply_variables(&raw, variables);

    let as_json: Value = serde_yaml::from_str(&substituted)?;
    let dag_value = as_json
        .get("dag")
        .cloned()
        .ok_or_else(|| ConfigError::MissingKey("dag".to_owned()))?;
    let dag_hash = graph::dag_hash(&dag_value)?;

    let doc: PipelineDocument = serde_yaml::from_str(&substituted)?;
    Ok((doc, dag_hash))
}

/// Load a variables file (a flat YAML mapping of name to JSON-serialisable
/// value).
pub fn load_variables(path: &Path) -> Result<HashMap<String, Value>, ConfigError> {
    let raw = read_file(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

/// Deploy-time provider overrides, loaded from a separate file than the
/// pipeline document itself — grounded in `prepare_configurations`'s
/// `configuration_file`, which always wins over the pipeline document's own
/// `run_log`/`catalog`/`secrets`/`mode` blocks when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub run_log: Option<ProviderConfig>,
    #[serde(default)]
    pub catalog: Option<ProviderConfig>,
    #[serde(default)]
    pub secrets: Option<ProviderConfig>,
    #[serde(default)]
    pub mode: Option<ProviderConfig>,
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = read_file(path)?;
    Ok(serde_yaml::from_str(&raw)?)
}

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

pub struct GraphBuilder<'a> {
    variables: &'a HashMap<String, Value>,
    base_dir: PathBuf,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(base_dir: impl Into<PathBuf>, variables: &'a HashMap<String, Value>) -> Self {
        Self {
            variables,
            base_dir: base_dir.into(),
        }
    }

    /// Build the root graph (`internal_branch_name == ""`) from a parsed
    /// `DagDoc`, then validate it (and every nested branch graph) in one
    /// call — see `graph::Graph::validate`.
    pub fn build_root(&self, dag: &DagDoc) -> Result<Graph, ConfigError> {
        let g = self.build_graph("", dag)?;
        g.validate()?;
        Ok(g)
    }

    fn build_graph(&self, internal_branch_name: &str, dag: &DagDoc) -> Result<Graph, ConfigError> {
        let mut g = Graph::new(
            internal_branch_name,
            dag.start_at.clone(),
            dag.description.clone(),
            dag.max_time,
        );

        for (name, step) in &dag.steps.0 {
            let internal_name = if internal_branch_name.is_empty() {
                name.clone()
            } else {
                format!("{internal_branch_name}.{name}")
            };
            let node = self.build_node(name, internal_name, internal_branch_name, step)?;
            g.add_node(node)?;
        }

        Ok(g)
    }

    fn build_node(
        &self,
        name: &str,
        internal_name: String,
        internal_branch_name: &str,
        step: &StepDoc,
    ) -> Result<Node, ConfigError> {
        let base_config = NodeConfig {
            command: step.command.clone(),
            command_type: step.command_type,
            next: step.next.clone(),
            on_failure: step.on_failure.clone(),
            retry: step.retry,
            catalog: step.catalog.clone(),
            mode_config: step.mode_config.clone(),
        };

        let kind = match step.node_type.as_str() {
            "task" => NodeKind::Task,
            "success" => NodeKind::Success,
            "fail" => NodeKind::Fail,
            "as-is" => NodeKind::AsIs {
                render_string: step.render_string.clone(),
            },
            "parallel" => {
                let branches_doc = step.branches.as_ref().ok_or_else(|| ConfigError::InvalidNode {
                    name: name.to_owned(),
                    message: "parallel node requires a non-empty 'branches' mapping".to_owned(),
                })?;
                if branches_doc.0.is_empty() {
                    return Err(ConfigError::InvalidNode {
                        name: name.to_owned(),
                        message: "parallel node requires at least one branch".to_owned(),
                    });
                }
                let mut branches = Vec::with_capacity(branches_doc.0.len());
                for (branch_name, branch_dag) in &branches_doc.0 {
                    let branch_internal = format!("{internal_name}.{branch_name}");
                    let sub_graph = self.build_graph(&branch_internal, branch_dag)?;
                    branches.push((branch_name.clone(), sub_graph));
                }
                NodeKind::Parallel { branches }
            }
            "map" => {
                let iterate_on = step.iterate_on.clone().ok_or_else(|| ConfigError::InvalidNode {
                    name: name.to_owned(),
                    message: "map node requires 'iterate_on'".to_owned(),
                })?;
                let iterate_as = step.iterate_as.clone().ok_or_else(|| ConfigError::InvalidNode {
                    name: name.to_owned(),
                    message: "map node requires 'iterate_as'".to_owned(),
                })?;
                let branch_doc = step.branch.as_ref().ok_or_else(|| ConfigError::InvalidNode {
                    name: name.to_owned(),
                    message: "map node requires a 'branch' sub-dag".to_owned(),
                })?;
                let branch_internal = format!("{internal_name}.%");
                let sub_graph = self.build_graph(&branch_internal, branch_doc)?;
                NodeKind::Map {
                    iterate_on,
                    iterate_as,
                    branch: Box::new(sub_graph),
                }
            }
            "dag" => {
                let dag_definition = step.dag_definition.clone().ok_or_else(|| ConfigError::InvalidNode {
                    name: name.to_owned(),
                    message: "dag node requires 'dag_definition'".to_owned(),
                })?;
                let raw = read_file(&self.base_dir.join(&dag_definition))?;
                let substituted = apply_variables(&raw, self.variables);
                let file: DagDefinitionFile = serde_yaml::from_str(&substituted)?;
                let branch_internal = format!("{internal_name}.dag");
                let sub_graph = self.build_graph(&branch_internal, &file.dag)?;
                NodeKind::Dag {
                    dag_definition,
                    branch: Box::new(sub_graph),
                }
            }
            other => {
                return Err(ConfigError::InvalidNode {
                    name: name.to_owned(),
                    message: format!("unknown node type '{other}'"),
                })
            }
        };

        Node::new(name, internal_name, internal_branch_name, base_config, kind)
            .map_err(ConfigError::Graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_variables_and_leaves_unknown_alone() {
        let mut vars = HashMap::new();
        vars.insert("env".to_owned(), Value::String("prod".to_owned()));
        let out = apply_variables("region: {{env}}, pool: {{missing}}", &vars);
        assert_eq!(out, "region: prod, pool: {{missing}}");
    }

    #[test]
    fn builds_a_linear_graph_from_yaml() {
        let yaml = r#"
dag:
  start_at: start
  steps:
    start:
      type: task
      command: "echo hi"
      command_type: shell
      next: success
      on_failure: fail
    success:
      type: success
    fail:
      type: fail
"#;
        let as_json: Value = serde_yaml::from_str(yaml).unwrap();
        let doc: PipelineDocument = serde_yaml::from_str(yaml).unwrap();
        assert!(as_json.get("dag").is_some());

        let vars = HashMap::new();
        let builder = GraphBuilder::new(".", &vars);
        let g = builder.build_root(&doc.dag).unwrap();
        assert_eq!(g.nodes().len(), 3);
        g.get_success_node().unwrap();
        g.get_fail_node().unwrap();
    }

    #[test]
    fn rejects_parallel_node_without_branches() {
        let yaml = r#"
dag:
  start_at: start
  steps:
    start:
      type: parallel
      next: success
    success:
      type: success
    fail:
      type: fail
"#;
        let doc: PipelineDocument = serde_yaml::from_str(yaml).unwrap();
        let vars = HashMap::new();
        let builder = GraphBuilder::new(".", &vars);
        assert!(matches!(
            builder.build_root(&doc.dag),
            Err(ConfigError::InvalidNode { .. })
        ));
    }
}
