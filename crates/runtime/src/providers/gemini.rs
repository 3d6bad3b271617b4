//! Gemini API backend.

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Part, Role, ToolCall, ToolResult,
    ToolSpec, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiToolSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

/// Gemini part objects are distinguished by their single field, not a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiPart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: ApiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: ApiFunctionResponse,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
struct ApiToolSet {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<ApiFunctionDecl>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDecl {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    usage_metadata: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiBackendBuilder {
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Override the API base URL (self-hosted proxies, tests).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn build(self) -> GeminiBackend {
        GeminiBackend {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            base_url: self.base_url,
        }
    }
}

/// Gemini `generateContent` backend.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn builder(
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> GeminiBackendBuilder {
        GeminiBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn role_to_api(role: Role) -> Option<String> {
        match role {
            // System text travels via systemInstruction, never as a content
            // role; anything else system-flavored degrades to user.
            Role::User | Role::System => Some("user".to_string()),
            Role::Assistant => Some("model".to_string()),
        }
    }

    fn message_to_api(msg: &Message) -> ApiContent {
        let parts = msg
            .parts
            .iter()
            .map(|part| match part {
                Part::Text { text } => ApiPart::Text { text: text.clone() },
                Part::ToolCall(call) => ApiPart::FunctionCall {
                    function_call: ApiFunctionCall {
                        name: call.name.clone(),
                        args: call.input.clone(),
                    },
                },
                Part::ToolResult(result) => ApiPart::FunctionResponse {
                    function_response: Self::result_to_api(result),
                },
            })
            .collect();

        ApiContent {
            role: Self::role_to_api(msg.role),
            parts,
        }
    }

    fn result_to_api(result: &ToolResult) -> ApiFunctionResponse {
        // Gemini correlates results by function name, and the response field
        // must be a JSON object; bare values get wrapped.
        match result {
            ToolResult::Success {
                tool_call_id,
                output,
            } => {
                let response = match output {
                    Value::Object(_) => output.clone(),
                    other => serde_json::json!({ "result": other }),
                };
                ApiFunctionResponse {
                    name: tool_call_id.clone(),
                    response,
                }
            }
            ToolResult::Failure {
                tool_call_id,
                error,
            } => ApiFunctionResponse {
                name: tool_call_id.clone(),
                response: serde_json::json!({ "error": error.to_string() }),
            },
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiFunctionDecl {
        ApiFunctionDecl {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.schema.clone(),
        }
    }

    fn content_to_message(content: ApiContent) -> Message {
        let parts = content
            .parts
            .into_iter()
            .filter_map(|part| match part {
                ApiPart::Text { text } => Some(Part::Text { text }),
                ApiPart::FunctionCall { function_call } => Some(Part::ToolCall(ToolCall {
                    // No call ids on this wire; the function name is the
                    // correlation key.
                    id: function_call.name.clone(),
                    name: function_call.name,
                    input: function_call.args,
                })),
                ApiPart::FunctionResponse { .. } => None,
            })
            .collect();

        Message {
            role: Role::Assistant,
            parts,
        }
    }
}

impl std::fmt::Display for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gemini({})", self.model)
    }
}

impl Backend for GeminiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let contents: Vec<ApiContent> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(Self::message_to_api)
            .collect();

        let system_instruction = request.system.map(|text| ApiContent {
            role: None,
            parts: vec![ApiPart::Text {
                text: text.to_string(),
            }],
        });

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![ApiToolSet {
                function_declarations: request.tools.iter().map(Self::tool_to_api).collect(),
            }]
        };

        let api_request = ApiRequest {
            contents,
            system_instruction,
            tools,
        };

        let url = format!("{}/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let content = api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| ModelError::InvalidResponse("no candidates returned".to_string()))?;

        let usage = api_response
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            message: Self::content_to_message(content),
            usage,
        })
    }
}
