//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for talking to MCP servers over the
//! streamable HTTP transport. It is built for servers that sit behind a
//! shared ingress: every request carries a configurable set of routing
//! headers (typically `Host`) so the ingress can pick the backend and the
//! policy that apply.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Client, Endpoint};
//!
//! # async fn example() -> mcp::Result<()> {
//! let endpoint = Endpoint::new("http://gateway.internal:8080/mcp")
//!     .with_header("Host", "currency-mcp.mcp.local");
//!
//! let client = Client::connect(endpoint)?;
//! client.initialize().await?;
//!
//! for tool in client.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = client.call_tool("get_exchange_rate", Some(serde_json::json!({
//!     "currency_from": "USD",
//!     "currency_to": "EUR",
//! }))).await?;
//! # let _ = result;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;

pub use client::{Client, DEFAULT_TIMEOUT, Endpoint, MAX_BODY_SIZE};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, ServerCapabilities, ServerInfo,
    Tool, ToolContent,
};
