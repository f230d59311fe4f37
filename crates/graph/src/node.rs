//! Node taxonomy: the polymorphic unit of work in a [`crate::Graph`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::naming::{self, MapVariable};

/// How a task node's `command` should be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Python,
    Shell,
}

/// `get`/`put` catalog settings attached to a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default)]
    pub get: Vec<String>,
    #[serde(default)]
    pub put: Vec<String>,
    #[serde(default)]
    pub compute_data_folder: Option<String>,
}

impl CatalogSettings {
    pub fn patterns_for(&self, stage: crate::Stage) -> &[String] {
        match stage {
            crate::Stage::Get => &self.get,
            crate::Stage::Put => &self.put,
        }
    }
}

/// Attributes shared by every node type, independent of `kind`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub command: Option<String>,
    pub command_type: Option<CommandType>,
    pub next: Option<String>,
    pub on_failure: Option<String>,
    pub retry: Option<u32>,
    pub catalog: Option<CatalogSettings>,
    #[serde(default)]
    pub mode_config: serde_json::Value,
}

/// Variant-specific behaviour and data. Composite variants own their
/// sub-graph(s) directly rather than through a registry, per the explicit
/// tagged-variant design called out in the source material.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Task,
    Success,
    Fail,
    AsIs { render_string: Option<String> },
    /// `branches` preserves declaration order: iteration order over sibling
    /// branches is otherwise unspecified by the engine (see concurrency
    /// model), but deterministic construction order keeps logs legible.
    Parallel { branches: Vec<(String, Graph)> },
    Map {
        iterate_on: String,
        iterate_as: String,
        branch: Box<Graph>,
    },
    Dag {
        dag_definition: String,
        branch: Box<Graph>,
    },
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Task => "task",
            NodeKind::Success => "success",
            NodeKind::Fail => "fail",
            NodeKind::AsIs { .. } => "as-is",
            NodeKind::Parallel { .. } => "parallel",
            NodeKind::Map { .. } => "map",
            NodeKind::Dag { .. } => "dag",
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, NodeKind::Parallel { .. } | NodeKind::Map { .. } | NodeKind::Dag { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeKind::Success | NodeKind::Fail)
    }
}

/// A single node in a [`Graph`].
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub internal_name: String,
    pub internal_branch_name: String,
    pub config: NodeConfig,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        internal_name: impl Into<String>,
        internal_branch_name: impl Into<String>,
        config: NodeConfig,
        kind: NodeKind,
    ) -> Result<Self, GraphError> {
        let name = name.into();
        if name.contains('.') || name.contains(naming::RESERVED_CHARACTER) {
            return Err(GraphError::IllegalNodeName(name));
        }
        Ok(Self {
            name,
            internal_name: internal_name.into(),
            internal_branch_name: internal_branch_name.into(),
            config,
            kind,
        })
    }

    pub fn node_type(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_terminal_node(&self) -> bool {
        // A node is terminal either because it's a success/fail marker, or
        // because its config carries no `next` — matches the source
        // contract that terminal-ness is read off `next`'s absence for
        // ordinary steps.
        self.kind.is_terminal() || self.config.next.is_none()
    }

    pub fn get_next_node(&self) -> Option<&str> {
        if self.is_terminal_node() {
            None
        } else {
            self.config.next.as_deref()
        }
    }

    pub fn get_on_failure_node(&self) -> Option<&str> {
        self.config.on_failure.as_deref()
    }

    pub fn get_neighbours(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(n) = self.get_next_node() {
            out.push(n);
        }
        if let Some(f) = self.get_on_failure_node() {
            out.push(f);
        }
        out
    }

    pub fn get_max_attempts(&self) -> u32 {
        match self.config.retry {
            Some(0) | None => 1,
            Some(n) => n,
        }
    }

    pub fn get_catalog_settings(&self) -> Option<&CatalogSettings> {
        self.config.catalog.as_ref()
    }

    pub fn get_mode_config(&self) -> &serde_json::Value {
        &self.config.mode_config
    }

    pub fn get_step_log_name(&self, map_variable: &MapVariable) -> String {
        naming::resolve_map_placeholders(&self.internal_name, map_variable)
    }

    pub fn get_branch_log_name(&self, map_variable: &MapVariable) -> String {
        naming::resolve_map_placeholders(&self.internal_branch_name, map_variable)
    }

    pub fn command_friendly_name(&self) -> String {
        naming::command_friendly_name(&self.internal_name)
    }

    /// Branches owned by this node, keyed by their *unresolved* internal
    /// branch name (map branches still contain the `%` placeholder here).
    pub fn branches(&self) -> Vec<(&str, &Graph)> {
        match &self.kind {
            NodeKind::Parallel { branches } => {
                branches.iter().map(|(k, g)| (k.as_str(), g)).collect()
            }
            NodeKind::Map { branch, .. } => vec![(branch.internal_branch_name.as_str(), branch)],
            NodeKind::Dag { branch, .. } => vec![(branch.internal_branch_name.as_str(), branch)],
            _ => Vec::new(),
        }
    }

    pub fn get_branch_by_name(&self, branch_name: &str) -> Result<&Graph, GraphError> {
        self.branches()
            .into_iter()
            .find(|(name, _)| *name == branch_name)
            .map(|(_, g)| g)
            .ok_or_else(|| GraphError::InvalidComposite {
                name: self.name.clone(),
                message: format!("no branch named '{branch_name}'"),
            })
    }
}

/// Runtime parameters resolved from the run log, passed into map-node
/// expansion (`iterate_on` must name a parameter holding a JSON array).
pub type Parameters = HashMap<String, serde_json::Value>;
