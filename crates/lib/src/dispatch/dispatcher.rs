//! Message dispatcher: one generic pipeline (classify, normalize, complete, reply) for every modality.

use crate::channels::{ChannelHandle, InboundMessage, MediaSource, Modality};
use crate::config::GeminiConfig;
use crate::dispatch::modality::{descriptor, ModalityDescriptor};
use crate::dispatch::replies::{
    unsupported_document_reply, FailureStage, GREETING, PDF_FAILURE_REPLY, TEXT_FAILURE_REPLY,
};
use crate::llm::{
    CompletionBackend, GeminiClient, MediaKind, RequestPart, UNEXPECTED_RESPONSE_REPLY,
};
use crate::media::{
    normalize_media, normalize_pdf, LopdfExtractor, MediaError, PdfTextExtractor, PDF_MIME,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Pipeline for a message that needs a completion call.
#[derive(Clone, Copy)]
enum Route {
    Text,
    Document,
    Media(&'static ModalityDescriptor),
}

impl Route {
    fn failure_reply(self) -> &'static str {
        match self {
            Route::Text => TEXT_FAILURE_REPLY,
            Route::Document => PDF_FAILURE_REPLY,
            Route::Media(d) => d.failure_reply,
        }
    }
}

/// Outcome of the normalize stage: either a request to send or a reply that needs no completion call.
enum Prepared {
    Parts(Vec<RequestPart>),
    Reply(String),
}

/// Routes each inbound message through the pipeline and sends exactly one reply to its conversation.
/// Holds no per-message state; safe to share across concurrent chat workers.
pub struct Dispatcher {
    completion: Arc<dyn CompletionBackend>,
    media: Arc<dyn MediaSource>,
    pdf: Arc<dyn PdfTextExtractor>,
    replies: Arc<dyn ChannelHandle>,
}

impl Dispatcher {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        media: Arc<dyn MediaSource>,
        replies: Arc<dyn ChannelHandle>,
    ) -> Self {
        Self {
            completion,
            media,
            pdf: Arc::new(LopdfExtractor),
            replies,
        }
    }

    /// Build a dispatcher backed by Gemini, using `channel` both to download attachments and to reply.
    pub fn from_config<C>(config: &GeminiConfig, api_key: &str, channel: Arc<C>) -> Result<Self>
    where
        C: ChannelHandle + MediaSource + 'static,
    {
        let client = GeminiClient::new(config, api_key).context("building gemini client")?;
        log::info!("dispatcher: using gemini model {}", config.model);
        Ok(Self::new(Arc::new(client), channel.clone(), channel))
    }

    pub fn with_pdf_extractor(mut self, pdf: Arc<dyn PdfTextExtractor>) -> Self {
        self.pdf = pdf;
        self
    }

    /// Handle one message end to end. Never fails: errors become fixed reply strings; a failed send is logged.
    pub async fn handle(&self, msg: InboundMessage) {
        let reply = self.reply_for(&msg).await;
        if let Err(e) = self
            .replies
            .send_message(&msg.conversation_id, &reply)
            .await
        {
            log::warn!(
                "dispatch ({}): send_message to {} failed: {}",
                msg.modality.as_str(),
                msg.conversation_id,
                e
            );
        }
    }

    /// Reply text for a message: the completion text, a fixed alternate reply, or the failure string.
    /// Never empty.
    pub async fn reply_for(&self, msg: &InboundMessage) -> String {
        let tag = msg.modality.as_str();
        let route = match msg.modality {
            Modality::Start => return GREETING.to_string(),
            Modality::Text => Route::Text,
            Modality::Document => Route::Document,
            Modality::Photo => Route::Media(descriptor(MediaKind::Image)),
            Modality::Audio => Route::Media(descriptor(MediaKind::Audio)),
            Modality::Video => Route::Media(descriptor(MediaKind::Video)),
        };
        let parts = match self.prepare(route, msg).await {
            Ok(Prepared::Parts(parts)) => parts,
            Ok(Prepared::Reply(reply)) => return reply,
            Err(e) => {
                log::warn!(
                    "dispatch ({}): {} failed: {}",
                    tag,
                    FailureStage::Normalize.as_str(),
                    e
                );
                return route.failure_reply().to_string();
            }
        };
        match self.completion.complete(&parts).await {
            Ok(reply) if reply.trim().is_empty() => {
                log::warn!("dispatch ({}): completion returned empty text", tag);
                UNEXPECTED_RESPONSE_REPLY.to_string()
            }
            Ok(reply) => reply,
            Err(e) => {
                log::warn!(
                    "dispatch ({}): {} failed: {}",
                    tag,
                    FailureStage::Completion.as_str(),
                    e
                );
                route.failure_reply().to_string()
            }
        }
    }

    async fn prepare(&self, route: Route, msg: &InboundMessage) -> Result<Prepared, MediaError> {
        match route {
            Route::Text => Ok(Prepared::Parts(vec![RequestPart::text(
                msg.text.clone().unwrap_or_default(),
            )])),
            Route::Document => self.prepare_document(msg).await,
            Route::Media(d) => self.prepare_media(d, msg).await,
        }
    }

    async fn prepare_media(
        &self,
        d: &ModalityDescriptor,
        msg: &InboundMessage,
    ) -> Result<Prepared, MediaError> {
        let attachment = msg
            .attachment
            .as_ref()
            .ok_or(MediaError::MissingAttachment)?;
        let media = normalize_media(self.media.as_ref(), attachment, d.kind, d.default_mime).await?;
        Ok(Prepared::Parts(vec![RequestPart::text(d.instruction), media]))
    }

    async fn prepare_document(&self, msg: &InboundMessage) -> Result<Prepared, MediaError> {
        let attachment = msg
            .attachment
            .as_ref()
            .ok_or(MediaError::MissingAttachment)?;
        let mime = attachment.declared_mime();
        if mime != Some(PDF_MIME) {
            log::info!(
                "dispatch (document): unsupported type {}",
                mime.unwrap_or("unknown")
            );
            return Ok(Prepared::Reply(unsupported_document_reply(mime)));
        }
        let part = normalize_pdf(self.media.as_ref(), self.pdf.clone(), attachment).await?;
        Ok(Prepared::Parts(vec![part]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::AttachmentRef;
    use crate::llm::GeminiError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<Vec<RequestPart>>>,
        fail: bool,
        reply: Option<String>,
    }

    #[async_trait]
    impl CompletionBackend for RecordingBackend {
        async fn complete(&self, parts: &[RequestPart]) -> Result<String, GeminiError> {
            self.calls.lock().unwrap().push(parts.to_vec());
            if self.fail {
                Err(GeminiError::Api("500 Internal Server Error".to_string()))
            } else {
                Ok(self.reply.clone().unwrap_or_else(|| "model reply".to_string()))
            }
        }
    }

    struct FakeChannel {
        download: Result<Vec<u8>, String>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeChannel {
        fn with_bytes(bytes: &[u8]) -> Self {
            Self {
                download: Ok(bytes.to_vec()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaSource for FakeChannel {
        async fn fetch(&self, _attachment: &AttachmentRef) -> Result<Vec<u8>, String> {
            self.download.clone()
        }
    }

    #[async_trait]
    impl ChannelHandle for FakeChannel {
        fn id(&self) -> &str {
            "fake"
        }

        fn stop(&self) {}

        async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct FixedPages(Vec<Option<String>>);

    impl PdfTextExtractor for FixedPages {
        fn page_texts(&self, _data: &[u8]) -> Result<Vec<Option<String>>, MediaError> {
            Ok(self.0.clone())
        }
    }

    fn dispatcher(backend: Arc<RecordingBackend>, channel: Arc<FakeChannel>) -> Dispatcher {
        Dispatcher::new(backend, channel.clone(), channel)
    }

    fn media_msg(modality: Modality, mime: Option<&str>) -> InboundMessage {
        InboundMessage::with_attachment(
            "fake",
            "100",
            modality,
            AttachmentRef::new("file-1", mime.map(str::to_string)),
        )
    }

    #[tokio::test]
    async fn text_sends_single_literal_part() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(b""));
        let d = dispatcher(backend.clone(), channel.clone());

        d.handle(InboundMessage::text("fake", "100", "what is rust?"))
            .await;

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![RequestPart::text("what is rust?")]);
        assert_eq!(
            *channel.sent.lock().unwrap(),
            vec![("100".to_string(), "model reply".to_string())]
        );
    }

    #[tokio::test]
    async fn photo_sends_instruction_then_image() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(&[1, 2, 3]));
        let d = dispatcher(backend.clone(), channel);

        let reply = d.reply_for(&media_msg(Modality::Photo, None)).await;
        assert_eq!(reply, "model reply");

        let calls = backend.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                RequestPart::text("Please analyze this image:"),
                RequestPart::media(MediaKind::Image, "image/jpeg", &[1, 2, 3]),
            ]
        );
    }

    #[tokio::test]
    async fn audio_keeps_platform_mime() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(&[9]));
        let d = dispatcher(backend.clone(), channel);

        d.reply_for(&media_msg(Modality::Audio, Some("audio/mpeg")))
            .await;

        let calls = backend.calls.lock().unwrap();
        assert_eq!(
            calls[0][0],
            RequestPart::text("Please transcribe or analyze this audio:")
        );
        assert_eq!(
            calls[0][1],
            RequestPart::media(MediaKind::Audio, "audio/mpeg", &[9])
        );
    }

    #[tokio::test]
    async fn completion_error_becomes_modality_string() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..Default::default()
        });
        let channel = Arc::new(FakeChannel::with_bytes(&[0]));
        let d = dispatcher(backend, channel);

        assert_eq!(
            d.reply_for(&InboundMessage::text("fake", "1", "hi")).await,
            "Error contacting Gemini."
        );
        assert_eq!(
            d.reply_for(&media_msg(Modality::Photo, None)).await,
            "Error processing image."
        );
        assert_eq!(
            d.reply_for(&media_msg(Modality::Audio, None)).await,
            "Error processing audio."
        );
        assert_eq!(
            d.reply_for(&media_msg(Modality::Video, None)).await,
            "Error processing video."
        );
    }

    #[tokio::test]
    async fn download_error_skips_completion() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel {
            download: Err("connection reset".to_string()),
            sent: Mutex::new(Vec::new()),
        });
        let d = dispatcher(backend.clone(), channel.clone());

        d.handle(media_msg(Modality::Video, Some("video/quicktime")))
            .await;

        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(
            *channel.sent.lock().unwrap(),
            vec![("100".to_string(), "Error processing video.".to_string())]
        );
    }

    #[tokio::test]
    async fn unsupported_document_makes_no_completion_call() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(b"PK"));
        let d = dispatcher(backend.clone(), channel.clone());

        d.handle(media_msg(Modality::Document, Some("application/zip")))
            .await;

        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(
            channel.sent.lock().unwrap()[0].1,
            "Unsupported document type: application/zip"
        );
    }

    #[tokio::test]
    async fn pdf_pages_become_one_text_part() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(b"%PDF"));
        let d = dispatcher(backend.clone(), channel).with_pdf_extractor(Arc::new(FixedPages(
            vec![
                Some("Hello".to_string()),
                Some(String::new()),
                Some("World".to_string()),
            ],
        )));

        let reply = d
            .reply_for(&media_msg(Modality::Document, Some(PDF_MIME)))
            .await;
        assert_eq!(reply, "model reply");

        let calls = backend.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![RequestPart::text(
                "Extracted text from PDF:\nHello\n\nWorld\n\nPlease summarize."
            )]
        );
    }

    #[tokio::test]
    async fn unparseable_pdf_reports_pdf_error() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(b"garbage"));
        let d = dispatcher(backend.clone(), channel);

        let reply = d
            .reply_for(&media_msg(Modality::Document, Some(PDF_MIME)))
            .await;
        assert_eq!(reply, "Error processing PDF.");
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_replies_with_greeting_only() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(b""));
        let d = dispatcher(backend.clone(), channel);

        let msg = InboundMessage {
            channel_id: "fake".to_string(),
            conversation_id: "5".to_string(),
            modality: Modality::Start,
            text: Some("/start".to_string()),
            attachment: None,
        };
        assert_eq!(d.reply_for(&msg).await, GREETING);
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn media_without_attachment_is_a_processing_error() {
        let backend = Arc::new(RecordingBackend::default());
        let channel = Arc::new(FakeChannel::with_bytes(b""));
        let d = dispatcher(backend.clone(), channel);

        let msg = InboundMessage {
            channel_id: "fake".to_string(),
            conversation_id: "5".to_string(),
            modality: Modality::Audio,
            text: None,
            attachment: None,
        };
        assert_eq!(d.reply_for(&msg).await, "Error processing audio.");
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_completion_text_gets_fallback_reply() {
        let backend = Arc::new(RecordingBackend {
            reply: Some("  \n".to_string()),
            ..Default::default()
        });
        let channel = Arc::new(FakeChannel::with_bytes(b""));
        let d = dispatcher(backend, channel.clone());

        d.handle(InboundMessage::text("fake", "8", "say nothing")).await;

        assert_eq!(
            *channel.sent.lock().unwrap(),
            vec![("8".to_string(), UNEXPECTED_RESPONSE_REPLY.to_string())]
        );
    }
}
