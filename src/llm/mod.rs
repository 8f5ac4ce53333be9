pub mod openai;
pub mod prompts;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Text-generation API key not found (set llm.api_key or OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("Text-generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Text-generation provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Text-generation account is not active: {message}")]
    AccountInactive { message: String },

    #[error("Text-generation provider rejected the credentials: {message}")]
    Unauthorized { message: String },

    #[error("Text-generation provider returned no content")]
    EmptyResponse,
}

impl LlmError {
    /// Whether every further call is certain to fail, so the whole batch
    /// should stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LlmError::MissingApiKey | LlmError::AccountInactive { .. } | LlmError::Unauthorized { .. }
        )
    }
}

/// A text-generation provider: one system prompt plus one user prompt in,
/// free text out. Implementations make no promise about the shape of the
/// returned text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}
