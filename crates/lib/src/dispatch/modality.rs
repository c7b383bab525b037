//! Media modality descriptors used by the generic pipeline.

use crate::llm::MediaKind;

/// What the pipeline needs to know about a media modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalityDescriptor {
    pub kind: MediaKind,
    /// Text part placed before the media part.
    pub instruction: &'static str,
    /// MIME type used when the platform reports none.
    pub default_mime: &'static str,
    /// Reply sent when download or completion fails.
    pub failure_reply: &'static str,
}

static IMAGE: ModalityDescriptor = ModalityDescriptor {
    kind: MediaKind::Image,
    instruction: "Please analyze this image:",
    default_mime: "image/jpeg",
    failure_reply: "Error processing image.",
};

static AUDIO: ModalityDescriptor = ModalityDescriptor {
    kind: MediaKind::Audio,
    instruction: "Please transcribe or analyze this audio:",
    default_mime: "audio/ogg",
    failure_reply: "Error processing audio.",
};

static VIDEO: ModalityDescriptor = ModalityDescriptor {
    kind: MediaKind::Video,
    instruction: "Please analyze this video:",
    default_mime: "video/mp4",
    failure_reply: "Error processing video.",
};

pub fn descriptor(kind: MediaKind) -> &'static ModalityDescriptor {
    match kind {
        MediaKind::Image => &IMAGE,
        MediaKind::Audio => &AUDIO,
        MediaKind::Video => &VIDEO,
    }
}
