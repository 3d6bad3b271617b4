use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tool execution.
///
/// Serializable so failures can be fed back to the model as tool results
/// instead of aborting the turn.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tool source unavailable: {0}")]
    Source(String),
    #[error("execution failed: {0}")]
    Execution(String),
}
