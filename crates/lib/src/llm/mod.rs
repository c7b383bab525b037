//! Completion backend abstraction and the Gemini generateContent client.
//!
//! Each call is a fresh single-turn request: no history is carried between calls.

mod gemini;
mod parts;

pub use gemini::{extract_reply_text, GeminiClient, GeminiError, UNEXPECTED_RESPONSE_REPLY};
pub use parts::{MediaKind, RequestPart};

use async_trait::async_trait;

/// Backend that turns an ordered, non-empty parts list into reply text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, parts: &[RequestPart]) -> Result<String, GeminiError>;
}
