//! Node helpers over the rehydrated `$node` map.

use super::value::Val;
use super::SandboxError;

const NODE_HELPERS: &[&str] = &["isExecuted", "hasData", "getNodeData", "firstExecuted"];

pub(super) fn is_node_helper(name: &str) -> bool {
    NODE_HELPERS.contains(&name)
}

pub(super) fn call(name: &str, nodes: &Val, args: &[Val]) -> Result<Val, SandboxError> {
    let node_name = args
        .first()
        .map(Val::to_display_string)
        .unwrap_or_default();
    Ok(match name {
        "isExecuted" => Val::Bool(is_executed(nodes, &node_name)),
        "hasData" => Val::Bool(has_data(nodes, &node_name)),
        "getNodeData" => match output(nodes, &node_name) {
            Some(value) if !value.is_nullish() => value.clone(),
            _ => args.get(1).cloned().unwrap_or(Val::Undefined),
        },
        "firstExecuted" => first_executed(nodes, args),
        _ => {
            return Err(SandboxError::Runtime(format!(
                "ReferenceError: {} is not defined",
                name
            )))
        }
    })
}

fn output<'v>(nodes: &'v Val, name: &str) -> Option<&'v Val> {
    match nodes {
        Val::Object(map) => map.get(name),
        _ => None,
    }
}

/// The node produced output, even if that output is empty.
fn is_executed(nodes: &Val, name: &str) -> bool {
    output(nodes, name).is_some()
}

/// The node produced something other than null or an empty collection.
fn has_data(nodes: &Val, name: &str) -> bool {
    match output(nodes, name) {
        None | Some(Val::Null) | Some(Val::Undefined) => false,
        Some(Val::Array(items)) => !items.is_empty(),
        Some(Val::Object(map)) => !map.is_empty(),
        Some(Val::Str(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Output of the first listed node that executed. Accepts an array of names
/// or the names as separate arguments.
fn first_executed(nodes: &Val, args: &[Val]) -> Val {
    let names: Vec<String> = match args {
        [Val::Array(items)] => items.iter().map(Val::to_display_string).collect(),
        _ => args.iter().map(Val::to_display_string).collect(),
    };
    names
        .iter()
        .find_map(|name| output(nodes, name))
        .cloned()
        .unwrap_or(Val::Undefined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nodes() -> Val {
        Val::from_json(&json!({
            "Fetch": {"items": [1]},
            "Empty": [],
            "Nothing": null,
            "Text": "hi"
        }))
    }

    #[test]
    fn test_is_executed_and_has_data() {
        let nodes = nodes();
        assert!(is_executed(&nodes, "Empty"));
        assert!(is_executed(&nodes, "Nothing"));
        assert!(!is_executed(&nodes, "Missing"));

        assert!(has_data(&nodes, "Fetch"));
        assert!(has_data(&nodes, "Text"));
        assert!(!has_data(&nodes, "Empty"));
        assert!(!has_data(&nodes, "Nothing"));
        assert!(!has_data(&nodes, "Missing"));
    }

    #[test]
    fn test_get_node_data_default() {
        let nodes = nodes();
        let got = call("getNodeData", &nodes, &[Val::str("Nothing"), Val::str("dflt")]).unwrap();
        assert_eq!(got.to_json(), Some(json!("dflt")));

        let got = call("getNodeData", &nodes, &[Val::str("Missing")]).unwrap();
        assert!(matches!(got, Val::Undefined));

        let got = call("getNodeData", &nodes, &[Val::str("Fetch")]).unwrap();
        assert_eq!(got.to_json(), Some(json!({"items": [1]})));
    }

    #[test]
    fn test_first_executed() {
        let nodes = nodes();
        let names = Val::from_json(&json!(["Missing", "Text", "Fetch"]));
        assert_eq!(first_executed(&nodes, &[names]).to_json(), Some(json!("hi")));

        let spread = [Val::str("Missing"), Val::str("Fetch")];
        assert_eq!(
            first_executed(&nodes, &spread).to_json(),
            Some(json!({"items": [1]}))
        );
        assert!(matches!(first_executed(&nodes, &[]), Val::Undefined));
    }
}
