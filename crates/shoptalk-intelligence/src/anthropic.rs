use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::provider::{CompletionRequest, Provider, ProviderError};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let messages: Vec<Value> = request
            .turns
            .iter()
            .map(|turn| {
                json!({
                    "role": turn.role.as_str(),
                    "content": turn.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": messages,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        // No native JSON mode here; json_output requests lean on the prompt.

        debug!(
            "Anthropic request: model={}, turns={}",
            self.model,
            request.turns.len()
        );

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let raw: Value = response.json().await?;
        let text = raw["content"][0]["text"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("no text block in response".to_string()))?;

        Ok(text.to_string())
    }
}
