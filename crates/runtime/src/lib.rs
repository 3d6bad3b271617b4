//! Agent runtime: model loop, LLM backend, and tool hosts.
//!
//! The runtime is organized around these concepts:
//!
//! - **AgentDefinition**: a declarative description of an agent: identity,
//!   behavioral instruction, model identifier, and remote tool sources.
//! - **Agent**: the run loop that turns a transcript into a reply, executing
//!   tool calls the model requests along the way.
//! - **Backend**: a trait abstracting LLM providers (Gemini here).
//! - **ToolHost**: a trait abstracting where tools come from; the MCP-backed
//!   host connects lazily so a misconfigured gateway only fails the turn that
//!   needed it.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{Agent, AgentDefinition, GeminiBackend, McpToolSource};
//!
//! # async fn example() -> runtime::Result<()> {
//! let definition = AgentDefinition {
//!     name: "currency_agent".into(),
//!     description: "An agent that can help with currency conversions".into(),
//!     instruction: "Answer only currency questions.".into(),
//!     model: "gemini-2.5-flash".into(),
//!     tool_sources: vec![mcp::Endpoint::new("http://gateway:8080/mcp")],
//! };
//!
//! let backend = GeminiBackend::builder("api-key", &definition.model).build();
//! let tools = McpToolSource::for_endpoint(definition.tool_sources[0].clone())?;
//! let agent = Agent::new(definition, backend, tools);
//!
//! let mut transcript = vec![runtime::Message::user("What is 1 USD in EUR?")];
//! let reply = agent.run(&mut transcript).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

mod agent;
mod error;
pub mod model;
mod providers;
mod tools;

pub use agent::{Agent, AgentDefinition, MAX_TURNS, RunStep};
pub use error::{Error, Result};
pub use model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolResult,
    ToolSpec, Usage,
};
pub use providers::{GeminiBackend, GeminiBackendBuilder};
pub use tools::{EmptyToolHost, McpToolSource, ToolError, ToolHost};
