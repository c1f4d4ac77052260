//! Output context builder.
//!
//! Assembles the `$node` map for a target node from the workflow graph. The
//! source of upstream data is decided once per call:
//!
//! 1. An explicit override map wins outright and is used verbatim.
//! 2. Otherwise each upstream node with pinned mock data contributes it.
//! 3. Otherwise, with exactly one upstream connection and literal input items,
//!    the items are unwrapped from their `{json: ...}` envelopes.
//!
//! Every value lands under the producing node's id and is aliased under its
//! name without overwriting anything already there.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::context::NodeOutputs;

/// A workflow node as seen by the builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub node_type: String,

    #[serde(default)]
    pub parameters: Value,

    /// Sample output fixed by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_data: Option<Value>,

    #[serde(default)]
    pub mock_data_pinned: bool,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_pinned_data(mut self, data: Value) -> Self {
        self.mock_data = Some(data);
        self.mock_data_pinned = true;
        self
    }

    /// Pinned sample data, if the node has any.
    pub fn pinned_data(&self) -> Option<&Value> {
        if self.mock_data_pinned {
            self.mock_data.as_ref()
        } else {
            None
        }
    }

    fn display_name(&self) -> Option<&str> {
        Some(self.name.as_str()).filter(|n| !n.is_empty())
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_node_id: String,
    pub target_node_id: String,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
        }
    }
}

/// Inputs to [`build_node_outputs`].
#[derive(Debug, Clone, Copy)]
pub struct OutputRequest<'a> {
    pub target_node_id: &'a str,
    pub nodes: &'a [WorkflowNode],
    pub connections: &'a [Connection],
    /// Literal items arriving at the target, typically `[{json: ...}, ...]`
    pub input_items: Option<&'a [Value]>,
    /// Caller-supplied outputs that bypass the graph entirely
    pub overrides: Option<&'a Map<String, Value>>,
}

impl<'a> OutputRequest<'a> {
    pub fn new(
        target_node_id: &'a str,
        nodes: &'a [WorkflowNode],
        connections: &'a [Connection],
    ) -> Self {
        Self {
            target_node_id,
            nodes,
            connections,
            input_items: None,
            overrides: None,
        }
    }

    pub fn with_input_items(mut self, items: &'a [Value]) -> Self {
        self.input_items = Some(items);
        self
    }

    pub fn with_overrides(mut self, overrides: &'a Map<String, Value>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    fn node(&self, id: &str) -> Option<&'a WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn upstream(&self) -> Vec<&'a Connection> {
        self.connections
            .iter()
            .filter(|c| c.target_node_id == self.target_node_id)
            .collect()
    }
}

/// Where one upstream node's output comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamSource<'a> {
    /// The node's pinned mock data
    Pinned { node_id: &'a str, data: &'a Value },
    /// The target's literal input items, attributed to the sole upstream node
    Items { node_id: &'a str, items: &'a [Value] },
}

/// How the `$node` map is populated for one call.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionStrategy<'a> {
    /// Caller overrides, used verbatim
    Overrides(&'a Map<String, Value>),
    /// Graph-derived sources, possibly empty
    Upstream(Vec<UpstreamSource<'a>>),
}

impl<'a> ResolutionStrategy<'a> {
    /// Decide the strategy for a request.
    pub fn decide(request: &OutputRequest<'a>) -> Self {
        if let Some(overrides) = request.overrides {
            return ResolutionStrategy::Overrides(overrides);
        }

        let upstream = request.upstream();
        let mut sources = Vec::new();

        for connection in &upstream {
            let pinned = request
                .node(&connection.source_node_id)
                .and_then(|node| node.pinned_data().map(|data| (node, data)));
            if let Some((node, data)) = pinned {
                sources.push(UpstreamSource::Pinned {
                    node_id: node.id.as_str(),
                    data,
                });
            }
        }

        if sources.is_empty() && upstream.len() == 1 {
            let only: &'a Connection = upstream[0];
            if let Some(items) = request.input_items.filter(|items| !items.is_empty()) {
                sources.push(UpstreamSource::Items {
                    node_id: only.source_node_id.as_str(),
                    items,
                });
            }
        }

        ResolutionStrategy::Upstream(sources)
    }
}

/// Build the `$node` map for `request.target_node_id`.
pub fn build_node_outputs(request: &OutputRequest<'_>) -> NodeOutputs {
    let strategy = ResolutionStrategy::decide(request);
    debug!(
        target_node = request.target_node_id,
        strategy = strategy_label(&strategy),
        "Building node output context"
    );

    let mut outputs = NodeOutputs::new();
    match strategy {
        ResolutionStrategy::Overrides(overrides) => {
            for (key, value) in overrides {
                outputs.insert(key.clone(), value.clone());
            }
            // Alias ids to names; explicit name keys already present win
            for (key, value) in overrides {
                if let Some(name) = request.node(key).and_then(WorkflowNode::display_name) {
                    outputs.alias(name, value.clone());
                }
            }
        }
        ResolutionStrategy::Upstream(sources) => {
            for source in sources {
                let (node_id, value) = match source {
                    UpstreamSource::Pinned { node_id, data } => (node_id, data.clone()),
                    UpstreamSource::Items { node_id, items } => (node_id, unwrap_items(items)),
                };
                let name = request.node(node_id).and_then(WorkflowNode::display_name);
                outputs.insert_aliased(node_id, name, value);
            }
        }
    }
    outputs
}

/// Strip `{json: ...}` envelopes. One item yields the bare value.
pub fn unwrap_items(items: &[Value]) -> Value {
    let mut unwrapped: Vec<Value> = items
        .iter()
        .map(|item| match item {
            Value::Object(map) if map.contains_key("json") => map["json"].clone(),
            other => other.clone(),
        })
        .collect();

    if unwrapped.len() == 1 {
        unwrapped.remove(0)
    } else {
        Value::Array(unwrapped)
    }
}

fn strategy_label(strategy: &ResolutionStrategy<'_>) -> &'static str {
    match strategy {
        ResolutionStrategy::Overrides(_) => "overrides",
        ResolutionStrategy::Upstream(sources) if sources.is_empty() => "empty",
        ResolutionStrategy::Upstream(_) => "upstream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph() -> (Vec<WorkflowNode>, Vec<Connection>) {
        let nodes = vec![
            WorkflowNode::new("n1", "HTTP Request").with_pinned_data(json!({"posts": [{"id": 1}]})),
            WorkflowNode::new("n2", "Transform"),
            WorkflowNode::new("n3", "Target"),
        ];
        let connections = vec![Connection::new("n1", "n3"), Connection::new("n2", "n3")];
        (nodes, connections)
    }

    #[test]
    fn test_overrides_short_circuit() {
        let (nodes, connections) = graph();
        let mut overrides = Map::new();
        overrides.insert("n2".into(), json!({"from": "override"}));

        let request = OutputRequest::new("n3", &nodes, &connections).with_overrides(&overrides);
        let outputs = build_node_outputs(&request);

        // Pinned data on n1 is ignored entirely
        assert!(!outputs.contains("n1"));
        assert_eq!(outputs.get("n2"), Some(&json!({"from": "override"})));
        assert_eq!(outputs.get("Transform"), Some(&json!({"from": "override"})));
    }

    #[test]
    fn test_override_name_key_is_not_overwritten_by_alias() {
        let (nodes, connections) = graph();
        let mut overrides = Map::new();
        overrides.insert("n2".into(), json!("by id"));
        overrides.insert("Transform".into(), json!("by name"));

        let request = OutputRequest::new("n3", &nodes, &connections).with_overrides(&overrides);
        let outputs = build_node_outputs(&request);

        assert_eq!(outputs.get("Transform"), Some(&json!("by name")));
        assert_eq!(outputs.get("n2"), Some(&json!("by id")));
    }

    #[test]
    fn test_pinned_data_used_per_connection() {
        let (nodes, connections) = graph();
        let request = OutputRequest::new("n3", &nodes, &connections);
        let outputs = build_node_outputs(&request);

        assert_eq!(outputs.get("n1"), Some(&json!({"posts": [{"id": 1}]})));
        assert_eq!(outputs.get("HTTP Request"), Some(&json!({"posts": [{"id": 1}]})));
        assert!(!outputs.contains("n2"));
    }

    #[test]
    fn test_single_upstream_items_unwrapped() {
        let nodes = vec![WorkflowNode::new("a", "Source"), WorkflowNode::new("b", "Sink")];
        let connections = vec![Connection::new("a", "b")];

        let single = vec![json!({"json": {"x": 1}})];
        let request = OutputRequest::new("b", &nodes, &connections).with_input_items(&single);
        let outputs = build_node_outputs(&request);
        assert_eq!(outputs.get("Source"), Some(&json!({"x": 1})));

        let many = vec![json!({"json": {"x": 1}}), json!({"json": {"x": 2}})];
        let request = OutputRequest::new("b", &nodes, &connections).with_input_items(&many);
        let outputs = build_node_outputs(&request);
        assert_eq!(outputs.get("a"), Some(&json!([{"x": 1}, {"x": 2}])));
    }

    #[test]
    fn test_items_ignored_with_multiple_upstreams() {
        let nodes = vec![
            WorkflowNode::new("a", "A"),
            WorkflowNode::new("b", "B"),
            WorkflowNode::new("c", "C"),
        ];
        let connections = vec![Connection::new("a", "c"), Connection::new("b", "c")];
        let items = vec![json!({"json": 1})];

        let request = OutputRequest::new("c", &nodes, &connections).with_input_items(&items);
        assert_eq!(
            ResolutionStrategy::decide(&request),
            ResolutionStrategy::Upstream(vec![])
        );
        assert!(build_node_outputs(&request).is_empty());
    }

    #[test]
    fn test_unpinned_mock_data_is_ignored() {
        let mut source = WorkflowNode::new("a", "A");
        source.mock_data = Some(json!({"sample": true}));
        let nodes = vec![source, WorkflowNode::new("b", "B")];
        let connections = vec![Connection::new("a", "b")];

        let request = OutputRequest::new("b", &nodes, &connections);
        assert!(build_node_outputs(&request).is_empty());
    }

    #[test]
    fn test_workflow_node_deserializes_camel_case() {
        let node: WorkflowNode = serde_json::from_value(json!({
            "id": "n1",
            "name": "Fetch",
            "type": "http",
            "parameters": {"url": "https://example.com"},
            "mockData": {"ok": true},
            "mockDataPinned": true
        }))
        .unwrap();
        assert_eq!(node.node_type, "http");
        assert_eq!(node.pinned_data(), Some(&json!({"ok": true})));
    }
}
