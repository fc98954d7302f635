use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::provider::{CompletionRequest, Provider, ProviderError};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 1024;

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
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
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        // System prompt rides the messages array on this API.
        let mut messages: Vec<Value> = Vec::with_capacity(request.turns.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        for turn in &request.turns {
            messages.push(json!({
                "role": turn.role.as_str(),
                "content": turn.content,
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": MAX_TOKENS,
        });
        if request.json_output {
            body["response_format"] = json!({"type": "json_object"});
        }

        debug!(
            "OpenAI request: model={}, turns={}",
            self.model,
            request.turns.len()
        );

        let response = self
            .client
            .post(API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let raw: Value = response.json().await?;
        let text = raw["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("no message content in response".to_string()))?;

        Ok(text.to_string())
    }
}
