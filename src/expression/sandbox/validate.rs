//! Pattern-based expression screening.
//!
//! The interpreter cannot reach host objects, so these checks are a second
//! line: they reject text that looks like an escape attempt before any of it
//! is parsed, and make such expressions visibly inert.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::error::{ValidationCode, ValidationError};

/// Deny-listed patterns with the message reported for each.
const FORBIDDEN_PATTERNS: &[(&str, &str)] = &[
    (
        r#"constructor\s*(\.|\[)\s*['"]?constructor"#,
        "constructor chain access is not allowed",
    ),
    (r"this\s*\.\s*constructor", "this.constructor is not allowed"),
    (r"\bprocess\b", "process is not allowed"),
    (r"\brequire\s*\(", "require() is not allowed"),
    (r"\bimport\s*\(", "dynamic import() is not allowed"),
    (r"\beval\s*\(", "eval() is not allowed"),
    (r"\bfunction\s*\(", "Function() is not allowed"),
    (r"__proto__", "__proto__ is not allowed"),
    (r"\.\s*prototype\b", ".prototype is not allowed"),
    (r"\bglobalthis\b", "globalThis is not allowed"),
    (r"\bglobal\b", "global is not allowed"),
    (r"\bmodule\s*\.", "module is not allowed"),
    (r"\bexports\b", "exports is not allowed"),
    (r"__dirname|__filename", "host path globals are not allowed"),
    (r"child_process", "child_process is not allowed"),
];

fn forbidden_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        FORBIDDEN_PATTERNS
            .iter()
            .map(|(pattern, message)| {
                let regex = Regex::new(&format!("(?i){}", pattern)).expect("valid regex");
                (regex, *message)
            })
            .collect()
    })
}

/// Check expression text before evaluation. An empty result means accepted.
pub fn validate_expression(expression: &str, max_length: usize) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let length = expression.chars().count();
    if length > max_length {
        errors.push(ValidationError::new(
            "expression",
            format!("expression is {} characters, limit is {}", length, max_length),
            ValidationCode::ExpressionTooLong,
        ));
        // Do not scan oversize input
        return errors;
    }

    for (regex, message) in forbidden_patterns() {
        if regex.is_match(expression) {
            errors.push(ValidationError::new(
                "expression",
                *message,
                ValidationCode::ForbiddenPattern,
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(expr: &str) -> bool {
        !validate_expression(expr, 10_000).is_empty()
    }

    #[test]
    fn test_accepts_ordinary_expressions() {
        assert!(!rejected("$json.price * 2"));
        assert!(!rejected("$node[\"HTTP Request\"].posts.map(p => p.id)"));
        assert!(!rejected("DateTime.now().toISO()"));
        // Substrings inside longer identifiers are fine
        assert!(!rejected("$json.globalSettings"));
        assert!(!rejected("$json.processedAt"));
    }

    #[test]
    fn test_rejects_deny_listed_patterns() {
        for expr in [
            "constructor.constructor('x')",
            "''.constructor['constructor']",
            "this.constructor",
            "process.exit()",
            "require('fs')",
            "import('fs')",
            "eval('1')",
            "Function('return 1')()",
            "({}).__proto__",
            "Array.prototype.map",
            "globalThis.x",
            "GLOBAL",
            "module.exports",
            "__dirname",
            "child_process",
        ] {
            assert!(rejected(expr), "{} should be rejected", expr);
        }
    }

    #[test]
    fn test_rejects_oversize_expression() {
        let long = "1+".repeat(6000);
        let errors = validate_expression(&long, 10_000);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::ExpressionTooLong);
        assert_eq!(errors[0].field, "expression");
    }

    #[test]
    fn test_every_match_is_reported() {
        let errors = validate_expression("process.exit(); require('fs')", 10_000);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.code == ValidationCode::ForbiddenPattern));
    }
}
