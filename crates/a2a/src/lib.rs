//! A2A (Agent-to-Agent) server surface.
//!
//! Wraps a configured [`runtime::Agent`] in a network-servable application:
//! an agent card at `/.well-known/agent.json` and a JSON-RPC endpoint at `/`
//! handling `message/send`, `message/stream` (SSE), `tasks/get`, and
//! `tasks/cancel`. Tasks and per-context transcripts live in memory for the
//! lifetime of the process.
//!
//! # Example
//!
//! ```ignore
//! use std::net::SocketAddr;
//!
//! # async fn example(agent: runtime::Agent<runtime::GeminiBackend, runtime::McpToolSource>,
//! #                  card: a2a::AgentCard) -> a2a::Result<()> {
//! let addr = SocketAddr::from(([0, 0, 0, 0], 10000));
//! a2a::serve(addr, agent, card).await
//! # }
//! ```

mod error;
mod protocol;
mod server;
mod store;

pub use error::{Error, Result};
pub use protocol::{
    AgentCapabilities, AgentCard, AgentSkill, Artifact, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, Message, MessagePart, MessageRole, MessageSendParams, RequestId, Task,
    TaskIdParams, TaskQueryParams, TaskState, TaskStatus, TaskStatusUpdate,
};
pub use server::{AppState, router, serve};
pub use store::TaskStore;
