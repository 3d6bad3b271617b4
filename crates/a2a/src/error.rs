//! Server error types.

use thiserror::Error;

/// Errors from running the A2A server.
///
/// Request-level failures never show up here; they are reported to the caller
/// as JSON-RPC error objects. This covers only process-fatal conditions such
/// as failing to bind the listen address.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
