//! Tool host trait.

use crate::model::{ToolCall, ToolSpec};
use crate::tools::ToolError;
use serde_json::Value;
use std::future::Future;

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute tool calls. This
/// is the boundary between the model loop and side effects.
///
/// `specs` is async because hosts backed by remote sources resolve their tool
/// list lazily: a host must not need network I/O to be constructed.
pub trait ToolHost: Send + Sync {
    /// Available tool specifications.
    fn specs(&self) -> impl Future<Output = Result<Vec<ToolSpec>, ToolError>> + Send;

    /// Execute a tool call.
    fn execute(&self, call: &ToolCall) -> impl Future<Output = Result<Value, ToolError>> + Send;
}
