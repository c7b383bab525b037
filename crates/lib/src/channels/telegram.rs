//! Telegram channel: long-poll getUpdates, getFile + file download, and sendMessage via Bot API.

use crate::channels::inbound::{AttachmentRef, InboundMessage, Modality};
use crate::channels::handle::{ChannelHandle, MediaSource};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const TELEGRAM_CHANNEL_ID: &str = "telegram";
const LONG_POLL_TIMEOUT: u64 = 30;
/// Per-request timeout for every Bot API call except getUpdates.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// sendMessage rejects longer text.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;
const START_COMMAND: &str = "/start";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<TelegramPhotoSize>>,
    #[serde(default)]
    pub document: Option<TelegramFileRef>,
    #[serde(default)]
    pub voice: Option<TelegramFileRef>,
    #[serde(default)]
    pub audio: Option<TelegramFileRef>,
    #[serde(default)]
    pub video: Option<TelegramFileRef>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// One resolution variant of a photo.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Document, voice, audio, or video attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramFileRef {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl From<&TelegramFileRef> for AttachmentRef {
    fn from(f: &TelegramFileRef) -> Self {
        AttachmentRef {
            file_id: f.file_id.clone(),
            mime_type: f.mime_type.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

/// Pick the highest-quality variant: largest width × height, then largest file size; the later entry wins ties.
pub fn largest_photo(sizes: &[TelegramPhotoSize]) -> Option<&TelegramPhotoSize> {
    sizes
        .iter()
        .max_by_key(|p| (u64::from(p.width) * u64::from(p.height), p.file_size.unwrap_or(0)))
}

/// Command name of a text message (`/start@MyBot payload` -> `/start`), if it is one.
fn command_name(text: &str) -> Option<&str> {
    let first = text.trim_start().split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    Some(first.split('@').next().unwrap_or(first))
}

impl TelegramMessage {
    /// Classify by precedence (text, photo, document, voice-or-audio, video) into an inbound message.
    /// Returns None for commands other than /start and for updates carrying none of these.
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let conversation_id = self.chat.id.to_string();
        if let Some(ref text) = self.text {
            return match command_name(text) {
                Some(START_COMMAND) => Some(InboundMessage {
                    channel_id: TELEGRAM_CHANNEL_ID.to_string(),
                    conversation_id,
                    modality: Modality::Start,
                    text: Some(text.clone()),
                    attachment: None,
                }),
                Some(other) => {
                    log::debug!("telegram: ignoring unsupported command {}", other);
                    None
                }
                None => Some(InboundMessage::text(
                    TELEGRAM_CHANNEL_ID,
                    conversation_id,
                    text.clone(),
                )),
            };
        }
        if let Some(best) = self.photo.as_deref().and_then(largest_photo) {
            let attachment = AttachmentRef::new(best.file_id.clone(), None);
            return Some(InboundMessage::with_attachment(
                TELEGRAM_CHANNEL_ID,
                conversation_id,
                Modality::Photo,
                attachment,
            ));
        }
        let (modality, file) = if let Some(ref d) = self.document {
            (Modality::Document, d)
        } else if let Some(a) = self.voice.as_ref().or(self.audio.as_ref()) {
            (Modality::Audio, a)
        } else if let Some(ref v) = self.video {
            (Modality::Video, v)
        } else {
            return None;
        };
        Some(InboundMessage::with_attachment(
            TELEGRAM_CHANNEL_ID,
            conversation_id,
            modality,
            AttachmentRef::from(file),
        ))
    }
}

/// Telegram channel connector: long-polls for updates, downloads attachments, sends replies via sendMessage.
pub struct TelegramChannel {
    id: String,
    api_base: String,
    token: String,
    running: AtomicBool,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl TelegramChannel {
    pub fn new(api_base: &str, token: impl Into<String>) -> Self {
        Self {
            id: TELEGRAM_CHANNEL_ID.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Start the getUpdates long-poll loop and forward messages to the router. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, String> {
        self.call_with_timeout(method, body, self.request_timeout)
            .await
    }

    async fn call_with_timeout<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, String> {
        let res = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(redact)?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("{} failed: {} {}", method, status, body));
        }
        let data: ApiResponse<T> = res.json().await.map_err(redact)?;
        if !data.ok {
            return Err(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            ));
        }
        data.result
            .ok_or_else(|| format!("{} returned no result", method))
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let mut body = serde_json::json!({ "timeout": LONG_POLL_TIMEOUT });
        if let Some(off) = offset {
            body["offset"] = serde_json::Value::from(off);
        }
        // The server holds the request for up to LONG_POLL_TIMEOUT before answering.
        let timeout = Duration::from_secs(LONG_POLL_TIMEOUT) + self.request_timeout;
        let updates: Vec<TelegramUpdate> = self
            .call_with_timeout("getUpdates", &body, timeout)
            .await?;
        let next_offset = updates
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1)
            .or(offset);
        Ok((updates, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        let mut body = serde_json::json!({ "url": url });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        let _: bool = self.call("setWebhook", &body).await?;
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), String> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }

    /// Send a text message to a chat via sendMessage API. Text over the platform limit is cut
    /// so the chat still gets a single message.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let fitted = truncate_message(text, TELEGRAM_MAX_MESSAGE_LEN);
        if fitted.len() < text.len() {
            log::debug!(
                "telegram: reply to {} truncated to {} chars",
                chat_id,
                TELEGRAM_MAX_MESSAGE_LEN
            );
        }
        let body = serde_json::json!({ "chat_id": chat_id, "text": fitted });
        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }

    /// Resolve a file_id to its download path via getFile.
    async fn get_file_path(&self, file_id: &str) -> Result<String, String> {
        let file: TelegramFile = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        file.file_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| format!("getFile returned no file_path for {}", file_id))
    }

    /// Download the full content of a file into memory.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        let path = self.get_file_path(file_id).await?;
        let url = format!("{}/file/bot{}/{}", self.api_base, self.token, path);
        let res = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(redact)?;
        if !res.status().is_success() {
            return Err(format!("file download failed: HTTP {}", res.status()));
        }
        let bytes = res.bytes().await.map_err(redact)?;
        log::debug!("telegram: downloaded {} ({} bytes)", file_id, bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Error text without the request URL, which embeds the bot token.
fn redact(e: reqwest::Error) -> String {
    e.without_url().to_string()
}

/// First `max_chars` characters of `text`.
pub fn truncate_message(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

async fn run_get_updates_loop(
    channel: Arc<TelegramChannel>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                offset = next;
                for u in updates {
                    let Some(inbound) = u.message.as_ref().and_then(TelegramMessage::to_inbound)
                    else {
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
        TelegramChannel::send_message(self, conversation_id, text).await
    }
}

#[async_trait]
impl MediaSource for TelegramChannel {
    async fn fetch(&self, attachment: &AttachmentRef) -> Result<Vec<u8>, String> {
        self.download_file(&attachment.file_id).await
    }
}
