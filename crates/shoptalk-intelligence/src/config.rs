use std::env;
use std::time::Duration;

use anyhow::{Result, bail};

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Which vendor backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

/// Provider selection and tuning, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct IntelligenceConfig {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl IntelligenceConfig {
    /// Resolve from the environment. `SHOPTALK_AI_PROVIDER` picks the vendor
    /// explicitly; when unset, whichever vendor key is present wins, with
    /// Anthropic preferred if both are.
    pub fn from_env() -> Result<Self> {
        let anthropic_key = non_empty_var("ANTHROPIC_API_KEY");
        let openai_key = non_empty_var("OPENAI_API_KEY");

        let kind = match non_empty_var("SHOPTALK_AI_PROVIDER") {
            Some(name) => match name.to_ascii_lowercase().as_str() {
                "anthropic" => ProviderKind::Anthropic,
                "openai" => ProviderKind::OpenAi,
                other => bail!("Unknown SHOPTALK_AI_PROVIDER '{}'", other),
            },
            None if anthropic_key.is_some() => ProviderKind::Anthropic,
            None if openai_key.is_some() => ProviderKind::OpenAi,
            None => bail!("Set ANTHROPIC_API_KEY or OPENAI_API_KEY to enable the assistant"),
        };

        let api_key = match kind {
            ProviderKind::Anthropic => match anthropic_key {
                Some(key) => key,
                None => bail!("ANTHROPIC_API_KEY must be set for the anthropic provider"),
            },
            ProviderKind::OpenAi => match openai_key {
                Some(key) => key,
                None => bail!("OPENAI_API_KEY must be set for the openai provider"),
            },
        };

        let model = non_empty_var("SHOPTALK_AI_MODEL").unwrap_or_else(|| {
            match kind {
                ProviderKind::Anthropic => DEFAULT_ANTHROPIC_MODEL,
                ProviderKind::OpenAi => DEFAULT_OPENAI_MODEL,
            }
            .to_string()
        });

        let timeout = non_empty_var("SHOPTALK_AI_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        Ok(Self {
            kind,
            api_key,
            model,
            timeout,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
