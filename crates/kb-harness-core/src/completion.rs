//! Text-completion capability used to turn retrieved context into answers.
//!
//! The answer-generating model is opaque to the core: it receives one
//! prompt string and returns one completion string. Backends (Ollama,
//! OpenAI) live in the app crate.

use async_trait::async_trait;

use crate::error::Result;

/// A text-completion backend.
///
/// Failures must be reported as
/// [`HarnessError::ExternalService`](crate::error::HarnessError::ExternalService).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}
