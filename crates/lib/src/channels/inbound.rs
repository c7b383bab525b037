//! Inbound message from a channel: delivered to the dispatcher for a single request/reply round trip.

/// Detected modality of an inbound message. Exactly one per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    /// The `/start` command.
    Start,
    Text,
    Photo,
    Document,
    /// Voice note or audio file.
    Audio,
    Video,
}

impl Modality {
    /// Short tag used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Start => "start",
            Modality::Text => "text",
            Modality::Photo => "image",
            Modality::Document => "pdf",
            Modality::Audio => "audio",
            Modality::Video => "video",
        }
    }
}

/// Handle to platform-hosted binary content (e.g. a Telegram file_id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub file_id: String,
    /// MIME type as reported by the platform, if any.
    pub mime_type: Option<String>,
}

impl AttachmentRef {
    pub fn new(file_id: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            file_id: file_id.into(),
            mime_type,
        }
    }

    /// Reported MIME type, ignoring blanks.
    pub fn declared_mime(&self) -> Option<&str> {
        self.mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// A message from a channel to be answered with exactly one reply in the same conversation.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    pub conversation_id: String,
    pub modality: Modality,
    pub text: Option<String>,
    pub attachment: Option<AttachmentRef>,
}

impl InboundMessage {
    pub fn text(
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            modality: Modality::Text,
            text: Some(text.into()),
            attachment: None,
        }
    }

    pub fn with_attachment(
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
        modality: Modality,
        attachment: AttachmentRef,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            modality,
            text: None,
            attachment: Some(attachment),
        }
    }
}
