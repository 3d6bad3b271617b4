use thiserror::Error;

use crate::model::ModelError;
use crate::tools::ToolError;

/// Errors from a single agent run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("turn limit reached after {0} model calls")]
    TurnLimit(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
