//! OpenAI Responses API completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{ApiKey, Completion, ModelError};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/responses";

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: Vec<ApiInput<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiInput<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    output: Vec<ApiOutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiOutputItem {
    Message {
        #[serde(default)]
        content: Vec<ApiOutputContent>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiOutputContent {
    OutputText {
        text: String,
    },
    Refusal {
        refusal: String,
    },
    #[serde(other)]
    Unknown,
}

impl ApiResponse {
    fn into_text(self) -> Result<String, ModelError> {
        let mut text = String::new();
        for item in self.output {
            let ApiOutputItem::Message { content } = item else {
                continue;
            };
            for part in content {
                match part {
                    ApiOutputContent::OutputText { text: t } => text.push_str(&t),
                    ApiOutputContent::Refusal { refusal } => {
                        return Err(ModelError::Api(format!("model refused: {refusal}")));
                    }
                    ApiOutputContent::Unknown => {}
                }
            }
        }
        Ok(text)
    }
}

/// OpenAI completion service.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    max_output_tokens: Option<u32>,
}

impl OpenAiCompletion {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_API_URL.to_string(),
            max_output_tokens: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}

#[async_trait]
impl Completion for OpenAiCompletion {
    async fn complete(&self, model_id: &str, prompt: &str) -> Result<String, ModelError> {
        let api_request = ApiRequest {
            model: model_id,
            input: vec![ApiInput {
                role: "user",
                content: prompt,
            }],
            max_output_tokens: self.max_output_tokens,
        };

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(self.api_key.expose())
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

        api_response.into_text()
    }

    fn name(&self) -> &str {
        "openai"
    }
}
