//! gemrelay core library: Telegram channel, media normalization, Gemini client, and the
//! dispatcher that relays each message to the model and the reply back to the chat.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod llm;
pub mod media;
