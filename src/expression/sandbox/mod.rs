//! Sandboxed evaluator for complex placeholder expressions.
//!
//! Evaluation runs four stages and any failure stops the pipeline:
//!
//! 1. **Validate** the expression text against length and deny-list rules.
//! 2. **Serialize** the context through a JSON round trip so nothing but
//!    plain data reaches the evaluator.
//! 3. **Execute** the expression with a hand-written parser and
//!    tree-walking interpreter under a wall-clock deadline.
//! 4. **Coerce** the result into a [`SandboxOutput`].
//!
//! The interpreter only knows the builtins registered in [`builtins`],
//! [`datetime`] and [`helpers`]. There is no scope to escape into.

mod builtins;
mod datetime;
mod helpers;
mod interp;
mod lexer;
mod parser;
mod validate;
mod value;

use std::time::Instant;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EvaluatorConfig;
use crate::error::ValidationError;

use super::context::ExpressionContext;
use interp::Interpreter;
use value::Val;

pub use parser::{parse_expression, Expr};
pub use validate::validate_expression;

/// Why an expression produced no usable value.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("expression rejected: {}", join_errors(.0))]
    Rejected(Vec<ValidationError>),

    #[error("context serialization failed: {0}")]
    Context(#[from] serde_json::Error),

    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("{0}")]
    Runtime(String),

    #[error("expression timed out after {0}ms")]
    Timeout(u64),

    #[error("resource limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("expression evaluated to undefined")]
    Undefined,
}

impl SandboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SandboxError::Rejected(_))
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum SandboxOutput {
    /// Any JSON-representable value
    Plain(Value),
    /// Produced by the `DateTime` helper; renders as its ISO string
    DateTime(DateTime<FixedOffset>),
}

impl SandboxOutput {
    pub fn into_value(self) -> Value {
        match self {
            SandboxOutput::Plain(value) => value,
            SandboxOutput::DateTime(dt) => Value::String(value::datetime_to_iso(&dt)),
        }
    }
}

/// Sandboxed expression evaluator.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: EvaluatorConfig,
}

impl Sandbox {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Run an expression (the text between `{{` and `}}`) against a context.
    pub fn evaluate(
        &self,
        expression: &str,
        ctx: &ExpressionContext,
    ) -> Result<SandboxOutput, SandboxError> {
        let errors = validate_expression(expression, self.config.max_expression_length);
        if !errors.is_empty() {
            return Err(SandboxError::Rejected(errors));
        }

        let roots = ctx.isolate()?;

        let started = Instant::now();
        let deadline = started + self.config.timeout();
        let ast = parse_expression(expression, self.config.max_depth)?;
        let mut interpreter = Interpreter::new(&roots, &self.config, deadline);
        let result = interpreter.run(&ast);
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Sandbox evaluation finished"
        );

        coerce(result?)
    }

    /// Evaluate, returning `None` on any failure.
    ///
    /// Rejections and timeouts are logged at `warn`, everything else at
    /// `debug`. Callers substitute the literal placeholder text.
    pub fn evaluate_or_fallback(&self, expression: &str, ctx: &ExpressionContext) -> Option<Value> {
        match self.evaluate(expression, ctx) {
            Ok(output) => Some(output.into_value()),
            Err(e) if e.is_timeout() || e.is_rejected() => {
                warn!(expression = %truncate(expression), error = %e, "Expression not evaluated");
                None
            }
            Err(e) => {
                debug!(expression = %truncate(expression), error = %e, "Expression fell back");
                None
            }
        }
    }
}

fn coerce(result: Val) -> Result<SandboxOutput, SandboxError> {
    match result {
        Val::DateTime(dt) => Ok(SandboxOutput::DateTime(dt)),
        other => other
            .to_json()
            .map(SandboxOutput::Plain)
            .ok_or(SandboxError::Undefined),
    }
}

fn truncate(expression: &str) -> String {
    const MAX: usize = 120;
    if expression.chars().count() <= MAX {
        expression.to_string()
    } else {
        let head: String = expression.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::context::NodeOutputs;
    use serde_json::json;
    use std::time::Duration;

    fn eval(expr: &str, ctx: &ExpressionContext) -> Value {
        Sandbox::default().evaluate(expr, ctx).unwrap().into_value()
    }

    #[test]
    fn test_arithmetic_and_ternary() {
        let ctx = ExpressionContext::for_item(json!({"price": 10, "qty": 3}));
        assert_eq!(eval("$json.price * $json.qty", &ctx), json!(30));
        assert_eq!(eval("$json.qty > 2 ? 'bulk' : 'single'", &ctx), json!("bulk"));
        assert_eq!(eval("(0.1 + 0.2).toFixed(2)", &ctx), json!("0.30"));
    }

    #[test]
    fn test_deny_list_rejects_before_execution() {
        let ctx = ExpressionContext::default();
        let sandbox = Sandbox::default();
        for expr in [
            "constructor.constructor('return 1')()",
            "process.exit()",
            "require('fs')",
            "globalThis",
        ] {
            let err = sandbox.evaluate(expr, &ctx).unwrap_err();
            assert!(err.is_rejected(), "{} should be rejected", expr);
            assert_eq!(sandbox.evaluate_or_fallback(expr, &ctx), None);
        }
    }

    #[test]
    fn test_timeout_is_bounded() {
        let sandbox = Sandbox::new(EvaluatorConfig::default().with_timeout_ms(50));
        let ctx = ExpressionContext::default();
        let expr = "Array.from({length: 3000}, (_, i) => Array.from({length: 3000}, (_, j) => i * j).length).length";

        let started = Instant::now();
        let err = sandbox.evaluate(expr, &ctx).unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {}", err);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn test_runaway_recursion_hits_depth_limit() {
        let ctx = ExpressionContext::default();
        let err = Sandbox::default()
            .evaluate("(f => f(f))(f => f(f))", &ctx)
            .unwrap_err();
        assert!(matches!(err, SandboxError::LimitExceeded(_)));
    }

    #[test]
    fn test_datetime_result_is_tagged() {
        let ctx = ExpressionContext::default();
        let out = Sandbox::default()
            .evaluate("DateTime.fromISO('2024-01-01T10:00:00Z').plus({days: 1})", &ctx)
            .unwrap();
        assert!(matches!(out, SandboxOutput::DateTime(_)));
        assert_eq!(out.into_value(), json!("2024-01-02T10:00:00.000Z"));
    }

    #[test]
    fn test_node_helpers_see_rehydrated_outputs() {
        let mut outputs = NodeOutputs::new();
        outputs.insert("Fetch", json!({"ok": true}));
        let ctx = ExpressionContext::default().with_node_outputs(outputs);

        assert_eq!(eval("isExecuted('Fetch')", &ctx), json!(true));
        assert_eq!(eval("hasData('Missing')", &ctx), json!(false));
        assert_eq!(eval("getNodeData('Missing', 'none')", &ctx), json!("none"));
        assert_eq!(eval("firstExecuted(['Missing', 'Fetch']).ok", &ctx), json!(true));
    }

    #[test]
    fn test_undefined_result_is_an_error() {
        let ctx = ExpressionContext::for_item(json!({}));
        let err = Sandbox::default().evaluate("$json.missing", &ctx).unwrap_err();
        assert!(matches!(err, SandboxError::Undefined));

        let err = Sandbox::default().evaluate("$json.missing.deep", &ctx).unwrap_err();
        assert!(err.to_string().contains("TypeError"));
    }

    #[test]
    fn test_reference_error_falls_back() {
        let ctx = ExpressionContext::default();
        let sandbox = Sandbox::default();
        let err = sandbox.evaluate("window.location", &ctx).unwrap_err();
        assert!(err.to_string().contains("ReferenceError"));
        assert_eq!(sandbox.evaluate_or_fallback("window.location", &ctx), None);
    }
}
