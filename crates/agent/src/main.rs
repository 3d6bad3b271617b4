//! Currency agent bootstrap.
//!
//! Resolves the gateway configuration from the environment, describes the
//! agent (identity, instruction, model, one MCP tool source routed through
//! the gateway), and serves it over A2A on port 10000. All orchestration
//! (tool-call routing, policy enforcement, model invocation) happens in the
//! runtime and at the gateway; this binary only wires them together.

mod config;
mod error;

use std::net::SocketAddr;

use a2a::{AgentCapabilities, AgentCard, AgentSkill};
use mcp::Endpoint;
use runtime::{Agent, AgentDefinition, GeminiBackend, McpToolSource};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::GatewayConfig;
use error::{Error, Result};

/// Fixed port the servable application binds to.
const PORT: u16 = 10000;

const AGENT_NAME: &str = "currency_agent";
const AGENT_DESCRIPTION: &str = "An agent that can help with currency conversions";
const MODEL: &str = "gemini-2.5-flash";

const SYSTEM_INSTRUCTION: &str = "You are a specialized assistant for currency conversions. \
    Your sole purpose is to use the 'get_exchange_rate' tool to answer questions about \
    currency exchange rates. If the user asks about anything other than currency conversion \
    or exchange rates, politely state that you cannot help with that topic and can only \
    assist with currency-related queries. Do not attempt to answer unrelated questions or \
    use tools for other purposes.";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::from_env();
    info!(url = %config.url, host = %config.routing_host, "connecting tools through MCP gateway");

    let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| Error::MissingApiKey)?;

    let definition = build_agent(&config);
    let backend = GeminiBackend::builder(api_key, &definition.model).build();
    // The endpoint is not contacted here; a bad gateway URL surfaces on the
    // first tool call instead of at startup.
    let tools = McpToolSource::for_endpoint(definition.tool_sources[0].clone())?;

    let card = agent_card(&definition);
    let agent = Agent::new(definition, backend, tools);

    let addr = SocketAddr::from(([0, 0, 0, 0], PORT));
    a2a::serve(addr, agent, card).await?;

    Ok(())
}

/// Assemble the declarative agent description for the resolved gateway.
fn build_agent(config: &GatewayConfig) -> AgentDefinition {
    let gateway = Endpoint::new(&config.url).with_header("Host", &config.routing_host);

    AgentDefinition {
        name: AGENT_NAME.to_string(),
        description: AGENT_DESCRIPTION.to_string(),
        instruction: SYSTEM_INSTRUCTION.to_string(),
        model: MODEL.to_string(),
        tool_sources: vec![gateway],
    }
}

/// The public card served at `/.well-known/agent.json`.
fn agent_card(definition: &AgentDefinition) -> AgentCard {
    AgentCard {
        name: definition.name.clone(),
        description: definition.description.clone(),
        url: format!("http://localhost:{PORT}/"),
        version: env!("CARGO_PKG_VERSION").to_string(),
        capabilities: AgentCapabilities { streaming: true },
        default_input_modes: vec!["text/plain".to_string()],
        default_output_modes: vec!["text/plain".to_string()],
        skills: vec![AgentSkill {
            id: "exchange_rates".to_string(),
            name: "Exchange rates".to_string(),
            description: "Answers questions about currency exchange rates".to_string(),
            tags: vec!["currency".to_string(), "exchange-rates".to_string()],
            examples: vec!["What is the exchange rate between USD and GBP?".to_string()],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::config::{DEFAULT_GATEWAY_URL, DEFAULT_ROUTING_HOST};

    #[test]
    fn agent_has_exactly_one_tool_source() {
        let config = GatewayConfig::resolve(|_| None);
        let definition = build_agent(&config);

        assert_eq!(definition.tool_sources.len(), 1);
        let gateway = &definition.tool_sources[0];
        assert_eq!(gateway.url, DEFAULT_GATEWAY_URL);
        assert_eq!(
            gateway.headers.get("Host").map(String::as_str),
            Some(DEFAULT_ROUTING_HOST)
        );
    }

    #[test]
    fn gateway_override_flows_into_tool_source() {
        let config = GatewayConfig::resolve(|name| {
            (name == config::GATEWAY_URL_VAR).then(|| "http://example:9999/mcp".to_string())
        });
        let definition = build_agent(&config);

        let gateway = &definition.tool_sources[0];
        assert_eq!(gateway.url, "http://example:9999/mcp");
        assert_eq!(
            gateway.headers.get("Host").map(String::as_str),
            Some(DEFAULT_ROUTING_HOST)
        );
    }

    #[test]
    fn definition_is_fixed() {
        let config = GatewayConfig::resolve(|_| None);
        let definition = build_agent(&config);

        assert_eq!(definition.name, "currency_agent");
        assert_eq!(definition.model, "gemini-2.5-flash");
        assert!(definition.instruction.contains("get_exchange_rate"));
    }

    #[test]
    fn card_advertises_streaming_text() {
        let config = GatewayConfig::resolve(|_| None);
        let card = agent_card(&build_agent(&config));

        assert!(card.capabilities.streaming);
        assert_eq!(card.default_input_modes, vec!["text/plain".to_string()]);
        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.skills[0].id, "exchange_rates");
    }
}
