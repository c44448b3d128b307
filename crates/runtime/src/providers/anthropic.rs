//! Anthropic Messages API completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{ApiKey, Completion, ModelError};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Unknown,
}

impl ApiResponse {
    fn into_text(self) -> String {
        self.content
            .into_iter()
            .filter_map(|block| match block {
                ApiResponseBlock::Text { text } => Some(text),
                ApiResponseBlock::Unknown => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic completion service.
#[derive(Debug, Clone)]
pub struct AnthropicCompletionBuilder {
    api_key: ApiKey,
    base_url: String,
    max_tokens: u32,
    system: Option<String>,
}

impl AnthropicCompletionBuilder {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: ANTHROPIC_API_URL.to_string(),
            max_tokens: 4096,
            system: None,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Point at a different endpoint (proxies, gateways).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn build(self) -> AnthropicCompletion {
        AnthropicCompletion {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            base_url: self.base_url,
            max_tokens: self.max_tokens,
            system: self.system,
        }
    }
}

/// Anthropic completion service.
pub struct AnthropicCompletion {
    client: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    max_tokens: u32,
    system: Option<String>,
}

impl AnthropicCompletion {
    pub fn builder(api_key: ApiKey) -> AnthropicCompletionBuilder {
        AnthropicCompletionBuilder::new(api_key)
    }
}

impl std::fmt::Display for AnthropicCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.base_url)
    }
}

#[async_trait]
impl Completion for AnthropicCompletion {
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, ModelError> {
        let api_request = ApiRequest {
            model: model_id,
            max_tokens: self.max_tokens,
            messages: vec![ApiMessage {
                role: "user",
                content: prompt,
            }],
            system: self.system.as_deref(),
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .header("x-api-key", self.api_key.expose())
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

        Ok(api_response.into_text())
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
