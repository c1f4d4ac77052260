//! Placeholder scanner.
//!
//! Finds `{{...}}` regions in configuration strings and resolves each one.
//! Content that looks like code goes to the [`Sandbox`] first; everything
//! else, and anything the sandbox cannot evaluate, is tried against the
//! reference grammar:
//!
//! | Form | Root |
//! |---|---|
//! | `$node["Name"].path` | upstream output by node id or name |
//! | `$vars.path` | user variables |
//! | `$workflow.path` | workflow metadata |
//! | `$execution.path` | execution metadata |
//! | `$json[n].path`, `json[n].path` | n-th current item |
//! | `$json.path`, `json.path` | current item |
//! | `$itemIndex` | index of the current item |
//!
//! A placeholder that cannot be resolved stays in the output verbatim.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex_lite::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;

use super::context::ExpressionContext;
use super::path::{lookup, lookup_segments, path_segments};
use super::sandbox::Sandbox;

/// `{{ ... }}` with at most one level of balanced inner braces.
pub fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{\{((?:[^{}]|\{[^{}]*\})*)\}\}").expect("valid regex"))
}

fn node_reference_regex() -> &'static Regex {
    static NODE_REGEX: OnceLock<Regex> = OnceLock::new();
    NODE_REGEX.get_or_init(|| {
        Regex::new(r#"^\$node(?:\[\s*(?:"([^"]*)"|'([^']*)')\s*\]|\.([A-Za-z_][A-Za-z0-9_]*))(.*)$"#)
            .expect("valid regex")
    })
}

fn json_index_regex() -> &'static Regex {
    static JSON_INDEX_REGEX: OnceLock<Regex> = OnceLock::new();
    JSON_INDEX_REGEX
        .get_or_init(|| Regex::new(r"^\$?json\[\s*(\d+)\s*\](.*)$").expect("valid regex"))
}

const COMPLEX_MARKERS: &[&str] = &["Math.", "JSON.", "Object.", "Array.", "DateTime."];
const OPERATOR_CHARS: &str = "+-*/%?:<>=!&|";

/// Whether placeholder content should be evaluated rather than looked up.
pub fn is_complex(content: &str) -> bool {
    let content = content.trim();
    content == "$now"
        || content == "$today"
        || content.contains('(')
        || content.chars().any(|c| OPERATOR_CHARS.contains(c))
        || COMPLEX_MARKERS.iter().any(|marker| content.contains(marker))
}

/// A direct data reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference<'a> {
    Node { name: String, path: &'a str },
    Vars(&'a str),
    Workflow(&'a str),
    Execution(&'a str),
    JsonIndex { index: usize, path: &'a str },
    Json(&'a str),
    ItemIndex,
}

/// `content` minus `root`, if `root` is a whole leading identifier.
fn strip_root<'a>(content: &'a str, root: &str) -> Option<&'a str> {
    let rest = content.strip_prefix(root)?;
    (rest.is_empty() || rest.starts_with('.') || rest.starts_with('[')).then_some(rest)
}

impl<'a> Reference<'a> {
    /// Parse trimmed placeholder content, trying each form in precedence order.
    pub fn parse(content: &'a str) -> Option<Self> {
        if let Some(caps) = node_reference_regex().captures(content) {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())?;
            let path = caps.get(4).map_or("", |m| m.as_str());
            return Some(Reference::Node { name, path });
        }
        if let Some(path) = strip_root(content, "$vars") {
            return Some(Reference::Vars(path));
        }
        if let Some(path) = strip_root(content, "$workflow") {
            return Some(Reference::Workflow(path));
        }
        if let Some(path) = strip_root(content, "$execution") {
            return Some(Reference::Execution(path));
        }
        if let Some(caps) = json_index_regex().captures(content) {
            let index = caps.get(1)?.as_str().parse().ok()?;
            let path = caps.get(2).map_or("", |m| m.as_str());
            return Some(Reference::JsonIndex { index, path });
        }
        if let Some(path) = strip_root(content, "$json").or_else(|| strip_root(content, "json")) {
            return Some(Reference::Json(path));
        }
        if content == "$itemIndex" {
            return Some(Reference::ItemIndex);
        }
        None
    }

    /// Look the reference up. `item` is the current `$json` root.
    pub fn resolve(&self, item: &Value, ctx: Option<&ExpressionContext>) -> Option<Value> {
        match self {
            Reference::Node { name, path } => lookup(ctx?.node.get(name)?, path),
            Reference::Vars(path) => lookup_in_map(&ctx?.vars, path),
            Reference::Workflow(path) => lookup(&ctx?.workflow, path),
            Reference::Execution(path) => lookup(&ctx?.execution, path),
            Reference::JsonIndex { index, path } => {
                let selected = match item {
                    Value::Array(items) => items.get(*index)?,
                    // A lone item behaves as a one-element list
                    other if *index == 0 => other,
                    _ => return None,
                };
                lookup(selected, path)
            }
            Reference::Json(path) => lookup(item, path),
            Reference::ItemIndex => Some(Value::from(ctx.map_or(0, |c| c.item_index))),
        }
    }
}

fn lookup_in_map(map: &Map<String, Value>, path: &str) -> Option<Value> {
    let segments = path_segments(path);
    match segments.split_first() {
        None => Some(Value::Object(map.clone())),
        Some((head, rest)) => lookup_segments(map.get(head)?, rest),
    }
}

/// Resolves placeholders with a configured sandbox.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    sandbox: Sandbox,
}

impl Resolver {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Resolve every placeholder in `raw`.
    ///
    /// - Without `{{` the input comes back unchanged.
    /// - If the whole (trimmed) input is one placeholder, the resolved value
    ///   is returned typed.
    /// - Otherwise each placeholder is substituted in place: strings as-is,
    ///   other values as JSON. Unresolved placeholders are kept literally.
    ///
    /// `$json` is the context's current item, or `fallback_item` when no
    /// context is given or its item is null.
    pub fn resolve_value(
        &self,
        raw: &str,
        fallback_item: &Value,
        ctx: Option<&ExpressionContext>,
    ) -> Value {
        if !raw.contains("{{") {
            return Value::String(raw.to_string());
        }

        let item = match ctx {
            Some(c) if !c.json.is_null() => &c.json,
            _ => fallback_item,
        };
        let regex = placeholder_regex();

        let trimmed = raw.trim();
        if let Some(caps) = regex.captures(trimmed) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            if whole == (0..trimmed.len()) {
                let content = caps.get(1).map_or("", |m| m.as_str());
                return self
                    .resolve_expression(content, item, ctx)
                    .unwrap_or_else(|| Value::String(raw.to_string()));
            }
        }

        let substituted = regex.replace_all(raw, |caps: &Captures<'_>| {
            let content = caps.get(1).map_or("", |m| m.as_str());
            match self.resolve_expression(content, item, ctx) {
                Some(Value::String(s)) => s,
                Some(value) => value.to_string(),
                None => caps.get(0).map_or("", |m| m.as_str()).to_string(),
            }
        });
        Value::String(substituted.into_owned())
    }

    /// Resolve a single placeholder's content. `None` means unresolved.
    pub fn resolve_expression(
        &self,
        content: &str,
        item: &Value,
        ctx: Option<&ExpressionContext>,
    ) -> Option<Value> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }

        if is_complex(content) {
            let eval_ctx = evaluation_context(item, ctx);
            if let Some(value) = self.sandbox.evaluate_or_fallback(content, &eval_ctx) {
                return Some(value);
            }
        }

        let resolved = Reference::parse(content).and_then(|r| r.resolve(item, ctx));
        if resolved.is_none() {
            debug!(placeholder = content, "Placeholder left unresolved");
        }
        resolved
    }

    /// Resolve every string inside a node's parameters, recursively.
    pub fn resolve_parameters(
        &self,
        parameters: &Value,
        fallback_item: &Value,
        ctx: Option<&ExpressionContext>,
    ) -> Value {
        match parameters {
            Value::String(raw) => self.resolve_value(raw, fallback_item, ctx),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_parameters(v, fallback_item, ctx))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_parameters(v, fallback_item, ctx)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Context handed to the sandbox, with `$json` filled from the fallback item.
fn evaluation_context<'c>(
    item: &Value,
    ctx: Option<&'c ExpressionContext>,
) -> Cow<'c, ExpressionContext> {
    match ctx {
        Some(c) if &c.json == item => Cow::Borrowed(c),
        Some(c) => Cow::Owned(c.clone().with_json(item.clone())),
        None => Cow::Owned(ExpressionContext::for_item(item.clone())),
    }
}

/// Resolve with default evaluator limits.
pub fn resolve_value(raw: &str, fallback_item: &Value, ctx: Option<&ExpressionContext>) -> Value {
    Resolver::default().resolve_value(raw, fallback_item, ctx)
}

/// Resolve every string in `parameters` with default evaluator limits.
pub fn resolve_parameters(
    parameters: &Value,
    fallback_item: &Value,
    ctx: Option<&ExpressionContext>,
) -> Value {
    Resolver::default().resolve_parameters(parameters, fallback_item, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorConfig;
    use crate::expression::context::NodeOutputs;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn node_context() -> ExpressionContext {
        let mut outputs = NodeOutputs::new();
        outputs.insert("HTTP Request", json!({"posts": [{"id": 1}, {"id": 2}]}));
        let mut vars = Map::new();
        vars.insert("region".into(), json!({"code": "eu"}));
        ExpressionContext::new()
            .with_node_outputs(outputs)
            .with_vars(vars)
            .with_workflow(json!({"id": "wf-1", "name": "Sync"}))
            .with_execution(json!({"id": "ex-9"}))
            .with_item_index(4)
    }

    #[test]
    fn test_plain_string_is_unchanged() {
        assert_eq!(resolve_value("no placeholders", &json!({}), None), json!("no placeholders"));
        assert_eq!(resolve_value("{ single }", &json!({}), None), json!("{ single }"));
    }

    #[test]
    fn test_single_placeholder_is_typed() {
        let obj = json!({"nested": [1, 2, {"deep": true}]});
        let item = json!({"x": obj});
        assert_eq!(resolve_value("{{$json.x}}", &item, None), obj);
        assert_eq!(resolve_value("  {{ $json.x.nested[2].deep }} ", &item, None), json!(true));
        assert_eq!(resolve_value("{{json.x.nested.length}}", &item, None), json!(3));
    }

    #[test]
    fn test_node_reference_by_name() {
        let ctx = node_context();
        assert_eq!(
            resolve_value(r#"{{$node["HTTP Request"].posts[0].id}}"#, &json!({}), Some(&ctx)),
            json!(1)
        );
        assert_eq!(
            resolve_value("{{$node['HTTP Request'].posts.1.id}}", &json!({}), Some(&ctx)),
            json!(2)
        );
    }

    #[test]
    fn test_metadata_roots() {
        let ctx = node_context();
        let item = json!({});
        assert_eq!(resolve_value("{{$vars.region.code}}", &item, Some(&ctx)), json!("eu"));
        assert_eq!(resolve_value("{{$workflow.name}}", &item, Some(&ctx)), json!("Sync"));
        assert_eq!(resolve_value("{{$execution.id}}", &item, Some(&ctx)), json!("ex-9"));
        assert_eq!(resolve_value("{{$itemIndex}}", &item, Some(&ctx)), json!(4));
    }

    #[test]
    fn test_indexed_json() {
        let items = json!([{"a": 1}, {"a": 2}]);
        assert_eq!(resolve_value("{{$json[1].a}}", &items, None), json!(2));
        assert_eq!(resolve_value("{{json[0].a}}", &json!({"a": 7}), None), json!(7));
        assert_eq!(resolve_value("{{$json[3].a}}", &items, None), json!("{{$json[3].a}}"));
    }

    #[test]
    fn test_quoted_keys_with_dots() {
        let item = json!({"a.b": 1, "meta": {"x.y": "z"}});
        assert_eq!(resolve_value(r#"{{$json["a.b"]}}"#, &item, None), json!(1));
        assert_eq!(resolve_value("{{ $json.meta['x.y'] }}", &item, None), json!("z"));
    }

    #[test]
    fn test_mixed_string_substitution() {
        let item = json!({"name": "Ada", "tags": ["a", "b"], "n": 3, "gone": null});
        assert_eq!(
            resolve_value("Hi {{$json.name}}, tags={{$json.tags}} n={{$json.n}}", &item, None),
            json!("Hi Ada, tags=[\"a\",\"b\"] n=3")
        );
        assert_eq!(
            resolve_value("x={{$json.gone}} y={{$json.missing.deep}}", &item, None),
            json!("x=null y={{$json.missing.deep}}")
        );
    }

    #[test]
    fn test_unresolved_placeholder_stays_literal() {
        let raw = "{{$node[\"Nope\"].value}}";
        assert_eq!(resolve_value(raw, &json!({}), Some(&node_context())), json!(raw));
        assert_eq!(resolve_value("{{ }}", &json!({}), None), json!("{{ }}"));
        assert_eq!(resolve_value("{{$unknown}}", &json!({}), None), json!("{{$unknown}}"));
    }

    #[test]
    fn test_complex_expressions_use_sandbox() {
        let item = json!({"price": 10, "qty": 3, "when": "2024-01-01T00:00:00Z"});
        assert_eq!(resolve_value("{{ $json.price * $json.qty }}", &item, None), json!(30));
        assert_eq!(
            resolve_value("Total: {{ $json.price * $json.qty }} EUR", &item, None),
            json!("Total: 30 EUR")
        );
        assert_eq!(
            resolve_value("{{ DateTime.fromISO($json.when).plus({days: 1}).toISODate() }}", &item, None),
            json!("2024-01-02")
        );
        assert_eq!(
            resolve_value("{{ {total: $json.price * 2} }}", &item, None),
            json!({"total": 20})
        );
    }

    #[test]
    fn test_deny_listed_expressions_stay_literal() {
        for raw in [
            "{{ constructor.constructor('return process')() }}",
            "{{ process.exit() }}",
            "{{ require('fs') }}",
        ] {
            assert_eq!(resolve_value(raw, &json!({}), None), json!(raw));
        }
    }

    #[test]
    fn test_timeout_returns_fallback_quickly() {
        let resolver = Resolver::new(Sandbox::new(EvaluatorConfig::default().with_timeout_ms(50)));
        let raw = "{{ Array.from({length: 5000}, (_, i) => Array.from({length: 5000}, (_, j) => i + j).length).length }}";

        let started = Instant::now();
        let value = resolver.resolve_value(raw, &json!({}), None);
        assert_eq!(value, json!(raw));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn test_allocation_heavy_expression_stays_literal() {
        let raw = "{{ Array.from({length: 100000}, () => Array(100000)).length }}";
        assert_eq!(resolve_value(raw, &json!({}), None), json!(raw));

        let raw = "{{ Array.from({length: 100000}, () => 'x'.repeat(100000)).length }}";
        assert_eq!(resolve_value(raw, &json!({}), None), json!(raw));
    }

    #[test]
    fn test_complexity_classification() {
        assert!(is_complex("$now"));
        assert!(is_complex("$json.a + 1"));
        assert!(is_complex("Math.max(1, 2)"));
        assert!(is_complex("$json.a ? 1 : 2"));
        assert!(!is_complex("$json.a.b[0]"));
        assert!(!is_complex("$node[\"HTTP Request\"].x"));
        assert!(!is_complex("$nowhere"));
    }

    #[test]
    fn test_reference_precedence() {
        assert_eq!(
            Reference::parse("$node[\"A\"].x"),
            Some(Reference::Node { name: "A".into(), path: ".x" })
        );
        assert_eq!(Reference::parse("$vars"), Some(Reference::Vars("")));
        assert_eq!(
            Reference::parse("$json[2].a"),
            Some(Reference::JsonIndex { index: 2, path: ".a" })
        );
        assert_eq!(Reference::parse("$json[\"k\"]"), Some(Reference::Json("[\"k\"]")));
        assert_eq!(Reference::parse("json"), Some(Reference::Json("")));
        assert_eq!(Reference::parse("$jsonx"), None);
    }

    #[test]
    fn test_resolve_parameters_recurses() {
        let item = json!({"id": 42, "name": "Ada"});
        let params = json!({
            "url": "https://api.example.com/users/{{$json.id}}",
            "body": {"user": "{{$json.name}}", "raw": "{{$json}}"},
            "list": ["{{$json.id}}", 5, true]
        });
        let resolved = resolve_parameters(&params, &item, None);
        assert_eq!(resolved["url"], "https://api.example.com/users/42");
        assert_eq!(resolved["body"]["user"], "Ada");
        assert_eq!(resolved["body"]["raw"], item);
        assert_eq!(resolved["list"], json!([42, 5, true]));
    }
}
