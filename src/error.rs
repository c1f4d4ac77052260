//! Error types for flowexpr.
//!
//! Two families live here. [`Error`] is the crate-level failure returned by
//! configuration loading and the CLI. [`ValidationError`] is the structured
//! `{field, message, code}` record used uniformly for cron-field problems
//! and expression-safety violations; callers inspect it before persisting
//! configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expression::SandboxError;

/// Result type alias for flowexpr operations.
pub type Result<T> = std::result::Result<T, Error>;

/// flowexpr error types.
///
/// Each variant maps to a stable code that callers can match on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error code for programmatic matching.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Expression(_) => "EXPRESSION_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Toml(_) => "TOML_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Convert to a JSON error envelope.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<SandboxError> for Error {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Rejected(errors) => Error::from(errors),
            other => Error::Expression(other.to_string()),
        }
    }
}

impl From<Vec<ValidationError>> for Error {
    fn from(errors: Vec<ValidationError>) -> Self {
        let joined = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Error::Validation(joined)
    }
}

/// Machine-parseable validation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// Cron string does not have exactly five fields.
    InvalidFieldCount,
    /// A field atom is not a number, wildcard, range, step or list.
    InvalidValue,
    /// A number falls outside the field's domain.
    OutOfRange,
    /// A range whose start is greater than its end.
    InvalidRange,
    /// A step of zero or a malformed step base.
    InvalidStep,
    /// Expression text exceeds the configured length ceiling.
    ExpressionTooLong,
    /// Expression text contains a deny-listed pattern.
    ForbiddenPattern,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::InvalidFieldCount => "INVALID_FIELD_COUNT",
            ValidationCode::InvalidValue => "INVALID_VALUE",
            ValidationCode::OutOfRange => "OUT_OF_RANGE",
            ValidationCode::InvalidRange => "INVALID_RANGE",
            ValidationCode::InvalidStep => "INVALID_STEP",
            ValidationCode::ExpressionTooLong => "EXPRESSION_TOO_LONG",
            ValidationCode::ForbiddenPattern => "FORBIDDEN_PATTERN",
        }
    }
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Which field failed (`minute`, `hour`, ..., or `expression`).
    pub field: String,
    /// Human-readable description.
    pub message: String,
    /// Stable code.
    pub code: ValidationCode,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Config("x".into()).code(), "CONFIG_ERROR");
        assert_eq!(Error::Expression("x".into()).code(), "EXPRESSION_ERROR");
    }

    #[test]
    fn test_to_json_envelope() {
        let json = Error::Validation("bad cron".into()).to_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["message"], "Validation error: bad cron");
    }

    #[test]
    fn test_sandbox_errors_map_to_codes() {
        let err: Error = SandboxError::Timeout(50).into();
        assert_eq!(err.code(), "EXPRESSION_ERROR");
        assert_eq!(err.to_json()["error"]["message"], "Expression error: expression timed out after 50ms");

        let rejected = SandboxError::Rejected(vec![ValidationError::new(
            "expression",
            "uses process",
            ValidationCode::ForbiddenPattern,
        )]);
        assert_eq!(Error::from(rejected).code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_validation_error_serializes_code() {
        let err = ValidationError::new("minute", "60 is out of range", ValidationCode::OutOfRange);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["field"], "minute");
        assert_eq!(json["code"], "OUT_OF_RANGE");
        assert_eq!(err.code.as_str(), "OUT_OF_RANGE");
    }

    #[test]
    fn test_validation_errors_fold_into_error() {
        let errors = vec![
            ValidationError::new("minute", "bad", ValidationCode::InvalidValue),
            ValidationError::new("hour", "worse", ValidationCode::OutOfRange),
        ];
        let err: Error = errors.into();
        let msg = err.to_string();
        assert!(msg.contains("minute (INVALID_VALUE): bad"));
        assert!(msg.contains("hour (OUT_OF_RANGE): worse"));
    }
}
