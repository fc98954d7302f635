use async_trait::async_trait;

/// Role of a single turn in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// Provider-neutral completion request. Each vendor module maps this onto
/// its own wire format.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
    /// Ask the vendor for structured JSON output where it supports that
    /// natively; otherwise the prompt has to carry the instruction.
    pub json_output: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Universal model provider interface. Implementations are selected once at
/// startup; everything downstream only sees this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name for logging/debugging
    fn name(&self) -> &'static str;

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}
