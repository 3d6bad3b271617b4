//! MCP-gateway-backed tool host.

use crate::model::{ToolCall, ToolSpec};
use crate::tools::{ToolError, ToolHost};
use mcp::{Client, Endpoint, Tool};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

/// Tool host backed by a remote MCP server behind a gateway.
///
/// Construction never touches the network. The MCP handshake and the tool
/// list fetch happen on first use, so a misconfigured gateway URL or routing
/// host surfaces as a failure in the conversation turn that needed the tools,
/// not at startup.
pub struct McpToolSource {
    client: Client,
    specs: OnceCell<Vec<ToolSpec>>,
}

impl McpToolSource {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            specs: OnceCell::new(),
        }
    }

    /// Create a tool source for an endpoint.
    pub fn for_endpoint(endpoint: Endpoint) -> mcp::Result<Self> {
        Ok(Self::new(Client::connect(endpoint)?))
    }

    /// The endpoint this source pulls tools from.
    pub fn endpoint(&self) -> &Endpoint {
        self.client.endpoint()
    }

    async fn ensure_specs(&self) -> Result<&Vec<ToolSpec>, ToolError> {
        self.specs
            .get_or_try_init(|| async {
                if !self.client.is_initialized().await {
                    self.client
                        .initialize()
                        .await
                        .map_err(|e| ToolError::Source(e.to_string()))?;
                }
                let specs: Vec<ToolSpec> =
                    self.client.tools().await.into_iter().map(to_spec).collect();
                debug!(
                    url = %self.client.endpoint().url,
                    count = specs.len(),
                    "resolved tools from gateway"
                );
                Ok(specs)
            })
            .await
    }
}

fn to_spec(tool: Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name,
        description: tool.description.unwrap_or_default(),
        schema: tool.input_schema,
    }
}

impl ToolHost for McpToolSource {
    async fn specs(&self) -> Result<Vec<ToolSpec>, ToolError> {
        Ok(self.ensure_specs().await?.clone())
    }

    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        self.ensure_specs().await?;

        let arguments = match &call.input {
            Value::Null => None,
            Value::Object(_) => Some(call.input.clone()),
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "tool arguments must be an object, got {other}"
                )));
            }
        };

        let result = self
            .client
            .call_tool(&call.name, arguments)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        serde_json::to_value(&result.content)
            .map_err(|e| ToolError::Execution(format!("serialize result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_conversion_defaults_description() {
        let tool = Tool {
            name: "get_exchange_rate".into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        };
        let spec = to_spec(tool);
        assert_eq!(spec.name, "get_exchange_rate");
        assert!(spec.description.is_empty());
    }

    #[tokio::test]
    async fn construction_is_lazy() {
        let endpoint = Endpoint::new("http://nowhere.invalid/mcp").with_header("Host", "x.local");
        let source = McpToolSource::for_endpoint(endpoint.clone()).unwrap();
        assert_eq!(source.endpoint(), &endpoint);
    }
}
