//! Text-generation gateway.
//!
//! [`TextGenerator`] is the request/response seam the change engine talks
//! to. [`LlmClient`] implements it against an OpenAI-compatible chat
//! completions endpoint with retry and error classification.

use async_trait::async_trait;

pub mod client;
pub mod error;
pub mod message;

pub use client::{LlmClient, LlmClientConfig};
pub use error::LlmError;
pub use message::{ChatMessage, ContentPart, ImageUrl, MessageContent};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Submit a conversation and return the assistant's reply text
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError>;

    /// Ask about a single image, sent inline as a data URL
    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<String, LlmError> {
        self.generate(vec![ChatMessage::user_with_image(prompt, image, mime_type)])
            .await
    }
}
