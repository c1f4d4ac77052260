//! Per-call expression context.
//!
//! An [`ExpressionContext`] is a snapshot of everything a placeholder may
//! reference. It is built fresh for each resolution and never cached, so data
//! from one workflow run cannot leak into another.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upstream node outputs reachable under both node id and node name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeOutputs(Map<String, Value>);

impl NodeOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value under an explicit key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Insert under `id`, then alias under `name` unless that name already
    /// holds a value.
    pub fn insert_aliased(&mut self, id: &str, name: Option<&str>, value: Value) {
        if let Some(name) = name.filter(|n| !n.is_empty() && *n != id) {
            self.alias(name, value.clone());
        }
        self.0.insert(id.to_string(), value);
    }

    /// Add `value` under `name` only if nothing is stored there yet.
    ///
    /// Returns whether the alias was added.
    pub fn alias(&mut self, name: &str, value: Value) -> bool {
        if self.0.contains_key(name) {
            return false;
        }
        self.0.insert(name.to_string(), value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for NodeOutputs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for NodeOutputs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Data available to placeholders and expressions.
///
/// Field names serialize with their `$` prefixes so the JSON form matches the
/// identifiers expressions use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionContext {
    /// Current item
    #[serde(rename = "$json", default)]
    pub json: Value,

    /// Upstream outputs keyed by node id and name
    #[serde(rename = "$node", default)]
    pub node: NodeOutputs,

    /// User-defined variables
    #[serde(rename = "$vars", default)]
    pub vars: Map<String, Value>,

    /// Workflow metadata (id, name, ...)
    #[serde(rename = "$workflow", default)]
    pub workflow: Value,

    /// Execution metadata (id, mode, ...)
    #[serde(rename = "$execution", default)]
    pub execution: Value,

    /// Index of the current item
    #[serde(rename = "$itemIndex", default)]
    pub item_index: usize,
}

impl ExpressionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose only data is the current item.
    pub fn for_item(item: Value) -> Self {
        Self {
            json: item,
            ..Self::default()
        }
    }

    pub fn with_json(mut self, json: Value) -> Self {
        self.json = json;
        self
    }

    pub fn with_node_outputs(mut self, outputs: NodeOutputs) -> Self {
        self.node = outputs;
        self
    }

    pub fn with_vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_workflow(mut self, workflow: Value) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_execution(mut self, execution: Value) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_item_index(mut self, index: usize) -> Self {
        self.item_index = index;
        self
    }

    /// Detached copy of every root, produced by a JSON text round trip.
    ///
    /// The evaluator only ever sees this copy. Anything that does not survive
    /// serialization is gone by construction.
    pub fn isolate(&self) -> serde_json::Result<Map<String, Value>> {
        let text = serde_json::to_string(self)?;
        serde_json::from_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alias_never_overwrites() {
        let mut outputs = NodeOutputs::new();
        outputs.insert("Fetch", json!({"explicit": true}));
        outputs.insert_aliased("node-1", Some("Fetch"), json!({"explicit": false}));

        assert_eq!(outputs.get("Fetch"), Some(&json!({"explicit": true})));
        assert_eq!(outputs.get("node-1"), Some(&json!({"explicit": false})));
    }

    #[test]
    fn test_insert_aliased_adds_both_keys() {
        let mut outputs = NodeOutputs::new();
        outputs.insert_aliased("n1", Some("HTTP Request"), json!([1, 2]));
        assert!(outputs.contains("n1"));
        assert!(outputs.contains("HTTP Request"));
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn test_isolate_uses_prefixed_roots() {
        let ctx = ExpressionContext::for_item(json!({"x": 1}))
            .with_workflow(json!({"id": "wf"}))
            .with_item_index(3);
        let roots = ctx.isolate().unwrap();

        assert_eq!(roots["$json"], json!({"x": 1}));
        assert_eq!(roots["$workflow"]["id"], "wf");
        assert_eq!(roots["$itemIndex"], 3);
        assert_eq!(roots["$node"], json!({}));
    }
}
