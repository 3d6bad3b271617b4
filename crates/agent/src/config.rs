//! Gateway configuration resolved from the environment.

/// Environment variable overriding the gateway transport URL.
pub const GATEWAY_URL_VAR: &str = "MCP_SERVER_URL";

/// Environment variable overriding the routing host.
pub const ROUTING_HOST_VAR: &str = "MCP_HOST_HEADER";

pub const DEFAULT_GATEWAY_URL: &str =
    "http://mcp-gateway-istio.gateway-system.svc.cluster.local:8080/mcp";

pub const DEFAULT_ROUTING_HOST: &str = "currency-mcp.mcp.local";

/// Where tool calls go, and which `Host` header steers them at the gateway.
///
/// Values are taken verbatim: no trimming, no URL validation. A malformed
/// gateway URL stays latent until the first tool call tries to use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub url: String,
    pub routing_host: String,
}

impl GatewayConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolve from any environment lookup. Absent or empty values fall back
    /// to the fixed defaults.
    pub fn resolve(get: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            url: resolve_var(&get, GATEWAY_URL_VAR, DEFAULT_GATEWAY_URL),
            routing_host: resolve_var(&get, ROUTING_HOST_VAR, DEFAULT_ROUTING_HOST),
        }
    }
}

fn resolve_var(get: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    match get(name) {
        Some(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        let config = GatewayConfig::resolve(|_| None);
        assert_eq!(
            config.url,
            "http://mcp-gateway-istio.gateway-system.svc.cluster.local:8080/mcp"
        );
        assert_eq!(config.routing_host, "currency-mcp.mcp.local");
    }

    #[test]
    fn overrides_are_verbatim() {
        // No trimming, no normalization.
        let config = GatewayConfig::resolve(|name| match name {
            GATEWAY_URL_VAR => Some("  http://example:9999/mcp ".to_string()),
            ROUTING_HOST_VAR => Some("other-mcp.mcp.local".to_string()),
            _ => None,
        });
        assert_eq!(config.url, "  http://example:9999/mcp ");
        assert_eq!(config.routing_host, "other-mcp.mcp.local");
    }

    #[test]
    fn empty_value_behaves_as_unset() {
        let config = GatewayConfig::resolve(|_| Some(String::new()));
        assert_eq!(config.url, DEFAULT_GATEWAY_URL);
        assert_eq!(config.routing_host, DEFAULT_ROUTING_HOST);
    }

    #[test]
    fn url_override_leaves_host_default() {
        let config = GatewayConfig::resolve(|name| {
            (name == GATEWAY_URL_VAR).then(|| "http://example:9999/mcp".to_string())
        });
        assert_eq!(config.url, "http://example:9999/mcp");
        assert_eq!(config.routing_host, DEFAULT_ROUTING_HOST);
    }
}
