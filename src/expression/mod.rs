//! Expression resolution.
//!
//! - [`scanner`] finds `{{...}}` placeholders and resolves them
//! - [`path`] walks dotted and bracketed paths through JSON
//! - [`context`] holds the data placeholders can reference
//! - [`outputs`] assembles upstream node outputs for a target node
//! - [`sandbox`] evaluates complex expressions under resource limits

pub mod context;
pub mod outputs;
pub mod path;
pub mod sandbox;
pub mod scanner;

pub use context::{ExpressionContext, NodeOutputs};
pub use outputs::{
    build_node_outputs, unwrap_items, Connection, OutputRequest, ResolutionStrategy,
    UpstreamSource, WorkflowNode,
};
pub use path::{get_path, lookup, normalize_path, path_segments};
pub use sandbox::{Sandbox, SandboxError, SandboxOutput};
pub use scanner::{is_complex, resolve_parameters, resolve_value, Reference, Resolver};
