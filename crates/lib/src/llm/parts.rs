//! Request parts for a single multimodal completion request.

use base64::Engine;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Kind of binary payload carried by a media part. Serialized as the part's tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// One element of the ordered parts list. Instructions precede media by convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    Text(String),
    Media {
        kind: MediaKind,
        mime_type: String,
        /// Base64 (standard alphabet, padded).
        data: String,
    },
}

impl RequestPart {
    pub fn text(s: impl Into<String>) -> Self {
        RequestPart::Text(s.into())
    }

    /// Base64-encode raw bytes into a media part.
    pub fn media(kind: MediaKind, mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        RequestPart::Media {
            kind,
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestPart::Text(s) => Some(s),
            RequestPart::Media { .. } => None,
        }
    }
}

#[derive(Serialize)]
struct MediaBody<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: &'a str,
}

// Wire shape: {"text": "..."} or {"<kind>": {"mimeType": "...", "data": "..."}}.
impl Serialize for RequestPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            RequestPart::Text(text) => map.serialize_entry("text", text)?,
            RequestPart::Media {
                kind,
                mime_type,
                data,
            } => map.serialize_entry(
                kind.as_str(),
                &MediaBody {
                    mime_type,
                    data,
                },
            )?,
        }
        map.end()
    }
}
