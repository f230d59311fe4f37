//! In-process analogue of the source's `MAGNUS_PRM_*` environment
//! namespace: a write-once-per-task channel that carries user-set
//! parameters out of a running task node.
//!
//! The in-process `LocalExecutor` path never touches the environment at
//! all — tasks and the engine share this channel directly. The subprocess
//! path (`CommandType::Shell`) still bridges through real environment
//! variables, since that's the only channel a child process has; see
//! [`env_prefix`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

/// Prefix used when parameters must cross a process boundary.
pub const PARAM_ENV_PREFIX: &str = "RAT_PARAM_";

/// Tracks parameters a task sets during its attempt, and metrics it tracks.
///
/// Cleared between attempts by [`ParameterChannel::clear`] — the engine
/// calls this after every failed attempt so a retried task starts from a
/// clean slate, matching `utils.get_user_set_parameters(remove=True)` in
/// the traversal core this crate is grounded on.
#[derive(Debug, Clone, Default)]
pub struct ParameterChannel {
    set_parameters: Arc<Mutex<HashMap<String, Value>>>,
    tracked_metrics: Arc<Mutex<HashMap<String, Value>>>,
}

impl ParameterChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_parameter(&self, name: impl Into<String>, value: Value) {
        self.set_parameters.lock().await.insert(name.into(), value);
    }

    pub async fn track_metric(&self, name: impl Into<String>, value: Value) {
        self.tracked_metrics.lock().await.insert(name.into(), value);
    }

    /// Drain and return every parameter set since the last `clear`.
    pub async fn drain_parameters(&self) -> HashMap<String, Value> {
        let mut guard = self.set_parameters.lock().await;
        std::mem::take(&mut *guard)
    }

    /// Drain and return every metric tracked since the last `clear`.
    pub async fn drain_metrics(&self) -> HashMap<String, Value> {
        let mut guard = self.tracked_metrics.lock().await;
        std::mem::take(&mut *guard)
    }

    /// Discard whatever has been set without returning it — used when an
    /// attempt fails and its partial writes must not leak into the next one.
    pub async fn clear(&self) {
        self.set_parameters.lock().await.clear();
        self.tracked_metrics.lock().await.clear();
    }

    /// Render the given parameters as `RAT_PARAM_<NAME>=<json>` pairs for a
    /// spawned child process.
    pub fn env_vars(parameters: &HashMap<String, Value>) -> Vec<(String, String)> {
        parameters
            .iter()
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (format!("{PARAM_ENV_PREFIX}{}", k.to_uppercase()), rendered)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn drain_clears_after_read() {
        let chan = ParameterChannel::new();
        chan.set_parameter("x", json!(1)).await;
        let drained = chan.drain_parameters().await;
        assert_eq!(drained.get("x"), Some(&json!(1)));
        assert!(chan.drain_parameters().await.is_empty());
    }

    #[test]
    fn env_vars_use_prefixed_uppercase_names() {
        let mut params = HashMap::new();
        params.insert("my_key".to_string(), json!("value"));
        let vars = ParameterChannel::env_vars(&params);
        assert_eq!(vars, vec![("RAT_PARAM_MY_KEY".to_string(), "value".to_string())]);
    }
}
