//! Channel handle and media source traits.

use crate::channels::inbound::AttachmentRef;
use async_trait::async_trait;

/// Handle to a running channel (stop, send message).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a text message to a conversation (e.g. Telegram chat_id). Default returns error.
    async fn send_message(&self, _conversation_id: &str, _text: &str) -> Result<(), String> {
        Err("send not implemented".to_string())
    }
}

/// Downloads the full binary content behind an attachment handle.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, String>;
}
