//! flowexpr - Expression and schedule engine for workflow automation
//!
//! flowexpr lets workflow node configuration reference upstream data through
//! `{{...}}` placeholders and lets trigger nodes author recurring schedules.
//!
//! ## Key Features
//!
//! - **Placeholder resolution**: `{{$json.field}}`, `{{$node["Name"].x}}`,
//!   `{{$vars.key}}`, typed when the whole string is one placeholder
//! - **Sandboxed expressions**: a hand-written parser and tree-walking
//!   interpreter with a deadline, size caps and no host access
//! - **Cron engine**: validation with structured errors, matching,
//!   next-run forecasting and English descriptions
//! - **Schedule normalization**: simple, datetime and cron authoring modes
//!   reduced to one canonical cron string
//!
//! ## Example
//!
//! ```
//! use flowexpr::expression::{resolve_value, ExpressionContext, NodeOutputs};
//! use serde_json::json;
//!
//! let mut outputs = NodeOutputs::new();
//! outputs.insert("HTTP Request", json!({"posts": [{"id": 1}]}));
//! let ctx = ExpressionContext::new().with_node_outputs(outputs);
//!
//! let id = resolve_value(r#"{{$node["HTTP Request"].posts[0].id}}"#, &json!({}), Some(&ctx));
//! assert_eq!(id, json!(1));
//!
//! let cron = flowexpr::schedule::describe_cron_expression("0 9 * * 1-5");
//! assert_eq!(cron, "Every weekday at 9:00 AM");
//! ```

pub mod config;
pub mod error;
pub mod expression;
pub mod schedule;
pub mod telemetry;

pub use config::Config;
pub use error::{Error, Result, ValidationCode, ValidationError};
pub use expression::{resolve_parameters, resolve_value, ExpressionContext, Resolver, Sandbox};
pub use schedule::{
    convert_schedule_settings, describe_cron_expression, get_next_execution_times,
    matches_cron_expression, validate_cron_expression, ScheduleSettings,
};
