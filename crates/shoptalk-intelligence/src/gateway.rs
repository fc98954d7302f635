use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use shoptalk_types::models::{Business, Message};

use crate::anthropic::AnthropicProvider;
use crate::config::{IntelligenceConfig, ProviderKind};
use crate::openai::OpenAiProvider;
use crate::provider::{CompletionRequest, Provider, Role, Turn};

/// Canned reply used whenever the model cannot be reached or answers with
/// something unusable. Callers treat it like any other reply text.
pub const FALLBACK_REPLY: &str =
    "I apologize, but I'm having trouble responding right now. Please try again.";

/// Upper bound on conversation turns sent as reply context.
const MAX_HISTORY_TURNS: usize = 40;

const ASSISTANT_SYSTEM_PROMPT: &str = r#"You are a concise home improvement assistant. Keep responses brief but informative, around 2-3 sentences. Focus on the most important points.

Key guidelines:
- Give short, direct answers
- Use simple English words only, no technical jargon
- If the user asks about non-home improvement topics, politely redirect
- Recommend consulting professionals for dangerous tasks
- Be friendly but professional

Begin with a brief greeting like "I can help with that." or "Let me assist you.""#;

/// Facade over the configured model provider. Both operations are
/// infallible by contract: every upstream or parsing failure degrades to a
/// usable answer instead of surfacing an error.
pub struct IntelligenceGateway {
    provider: Box<dyn Provider>,
}

impl IntelligenceGateway {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Build the gateway from environment configuration.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = IntelligenceConfig::from_env()?;

        let provider: Box<dyn Provider> = match config.kind {
            ProviderKind::Anthropic => Box::new(AnthropicProvider::new(
                config.api_key,
                config.model.clone(),
                config.timeout,
            )?),
            ProviderKind::OpenAi => Box::new(OpenAiProvider::new(
                config.api_key,
                config.model.clone(),
                config.timeout,
            )?),
        };

        info!(
            "Intelligence provider: {} (model {})",
            provider.name(),
            config.model
        );
        Ok(Self { provider })
    }

    /// Rank candidate profiles against a free-text need. Keeps only the
    /// candidates the model names, in the model's order. On any failure the
    /// input comes back unchanged; ranking is an enhancement, never a gate.
    pub async fn match_businesses(&self, query: &str, candidates: Vec<Business>) -> Vec<Business> {
        if candidates.is_empty() {
            return candidates;
        }

        let request = CompletionRequest {
            system: None,
            turns: vec![Turn {
                role: Role::User,
                content: build_matching_prompt(query, &candidates),
            }],
            json_output: true,
        };

        let body = match self.provider.complete(request).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Business matching unavailable, returning unranked: {}", e);
                return candidates;
            }
        };

        match parse_match_payload(&body) {
            Some(payload) => {
                if let Some(reasoning) = &payload.reasoning {
                    debug!("Match reasoning: {}", reasoning);
                }
                rank_candidates(candidates, &payload.matches)
            }
            None => {
                warn!("Unparseable matching response, returning unranked");
                candidates
            }
        }
    }

    /// Produce the assistant's next reply from the running conversation.
    /// The last entry of `history` is the turn being answered. Any provider
    /// failure degrades to [`FALLBACK_REPLY`].
    pub async fn generate_reply(&self, history: &[Message]) -> String {
        let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
        let mut turns: Vec<Turn> = history[start..]
            .iter()
            .map(|m| Turn {
                role: if m.is_ai_assistant {
                    Role::Assistant
                } else {
                    Role::User
                },
                content: m.content.clone(),
            })
            .collect();

        // The Anthropic API rejects a transcript that opens with the
        // assistant, so drop any leading assistant turns.
        let lead = turns
            .iter()
            .take_while(|t| t.role == Role::Assistant)
            .count();
        turns.drain(..lead);

        if turns.is_empty() {
            warn!("No user turns in history, using fallback reply");
            return FALLBACK_REPLY.to_string();
        }

        let request = CompletionRequest {
            system: Some(ASSISTANT_SYSTEM_PROMPT.to_string()),
            turns,
            json_output: false,
        };

        match self.provider.complete(request).await {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    warn!("Empty reply from {}, using fallback", self.provider.name());
                    FALLBACK_REPLY.to_string()
                } else {
                    reply.to_string()
                }
            }
            Err(e) => {
                warn!("Reply generation failed, using fallback: {}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatchPayload {
    matches: Vec<i64>,
    reasoning: Option<String>,
}

fn parse_match_payload(body: &str) -> Option<MatchPayload> {
    serde_json::from_str(extract_json_block(body)).ok()
}

fn build_matching_prompt(query: &str, candidates: &[Business]) -> String {
    let profiles: Vec<Value> = candidates
        .iter()
        .map(|b| {
            json!({
                "id": b.id,
                "description": b.description,
                "category": b.category,
                "location": b.location,
                "services": b.services,
            })
        })
        .collect();

    format!(
        "You are an expert business matcher. Given this user query: \"{}\" and these business \
         profiles: {}, analyze the semantic relationship between what the user needs and what \
         businesses can provide. Consider capabilities, context, and potential solutions even if \
         the exact terms don't match. For example, if a user needs 'home cooling solution', match \
         with businesses offering 'AC installation' or 'HVAC services'. Return a JSON response in \
         this format: {{ \"matches\": [business_ids], \"reasoning\": \"explanation\" }}",
        query,
        serde_json::to_string(&profiles).unwrap_or_else(|_| "[]".to_string()),
    )
}

/// Keep only the candidates the model named, ordered by position in its
/// list. Ids the model invented are ignored; a repeated id ranks at its
/// first mention.
fn rank_candidates(candidates: Vec<Business>, ranked_ids: &[i64]) -> Vec<Business> {
    let mut position: HashMap<i64, usize> = HashMap::new();
    for (i, id) in ranked_ids.iter().enumerate() {
        position.entry(*id).or_insert(i);
    }

    let mut kept: Vec<Business> = candidates
        .into_iter()
        .filter(|b| position.contains_key(&b.id))
        .collect();
    kept.sort_by_key(|b| position.get(&b.id).copied());
    kept
}

/// Extract JSON from a model response that may wrap it in markdown fences
/// or surround it with prose.
fn extract_json_block(text: &str) -> &str {
    // Try to find ```json ... ``` blocks
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    // Try to find ``` ... ``` blocks (without language specifier)
    if let Some(start) = text.find("```") {
        let start = start + 3;
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with('{') || content.starts_with('[') {
                return content;
            }
        }
    }

    // Fall back to the outermost brace pair
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if end > start {
                return &text[start..=end];
            }
        }
    }

    text
}
