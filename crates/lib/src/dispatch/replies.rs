//! Fixed user-facing reply strings. Media failure strings live with their modality descriptors.

pub const GREETING: &str =
    "Hello! I am your multimodal Gemini 2.5-flash bot.\nSend text, images, audio, video, or PDFs.";

/// Where in the pipeline a handler failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Downloading or converting the attachment.
    Normalize,
    /// Calling the completion backend.
    Completion,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Normalize => "normalize",
            FailureStage::Completion => "completion",
        }
    }
}

/// Reply sent when a text message's completion call fails.
pub const TEXT_FAILURE_REPLY: &str = "Error contacting Gemini.";
/// Reply sent when a PDF cannot be downloaded, parsed, or summarized.
pub const PDF_FAILURE_REPLY: &str = "Error processing PDF.";

/// Reply for documents other than PDF. No completion call is made for these.
pub fn unsupported_document_reply(mime_type: Option<&str>) -> String {
    format!("Unsupported document type: {}", mime_type.unwrap_or("unknown"))
}
