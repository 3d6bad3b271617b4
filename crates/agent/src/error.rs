//! Bootstrap error types.

use thiserror::Error;

/// Startup errors. Anything here is fatal: the process prints the error and
/// exits.
#[derive(Debug, Error)]
pub enum Error {
    /// The model backend cannot authenticate without a key.
    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,

    /// Constructing the tool source failed.
    #[error(transparent)]
    Mcp(#[from] mcp::Error),

    /// The server failed to bind or run.
    #[error(transparent)]
    Serve(#[from] a2a::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
