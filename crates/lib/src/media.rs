//! Media normalizer: turns a platform attachment into a request part.
//!
//! Photos, audio, and video are downloaded in full and base64-encoded with the platform MIME type
//! (or a per-kind default). PDFs are reduced to their page text and wrapped in a summarization prompt.

use crate::channels::{AttachmentRef, MediaSource};
use crate::llm::{MediaKind, RequestPart};
use std::sync::Arc;

pub const PDF_MIME: &str = "application/pdf";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("message has no attachment")]
    MissingAttachment,
    #[error("attachment download failed: {0}")]
    Download(String),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// MIME type used when the platform reports none for this kind.
pub fn default_mime(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image/jpeg",
        MediaKind::Audio => "audio/ogg",
        MediaKind::Video => "video/mp4",
    }
}

/// Download the attachment and wrap it as a media part of the given kind.
pub async fn normalize_media(
    source: &dyn MediaSource,
    attachment: &AttachmentRef,
    kind: MediaKind,
    fallback_mime: &str,
) -> Result<RequestPart, MediaError> {
    let bytes = source
        .fetch(attachment)
        .await
        .map_err(MediaError::Download)?;
    let mime = attachment.declared_mime().unwrap_or(fallback_mime);
    Ok(RequestPart::media(kind, mime, &bytes))
}

/// Per-page text extraction. `None` marks a page whose text could not be extracted.
pub trait PdfTextExtractor: Send + Sync {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<Option<String>>, MediaError>;
}

/// [`PdfTextExtractor`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfTextExtractor for LopdfExtractor {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<Option<String>>, MediaError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| MediaError::Pdf(e.to_string()))?;
        let pages = doc
            .get_pages()
            .keys()
            .map(|&n| match doc.extract_text(&[n]) {
                Ok(text) => Some(text.trim_end_matches('\n').to_string()),
                Err(e) => {
                    log::debug!("pdf: page {} has no extractable text: {}", n, e);
                    None
                }
            })
            .collect();
        Ok(pages)
    }
}

/// Join page texts with newlines; missing pages contribute an empty line.
pub fn join_page_texts(pages: &[Option<String>]) -> String {
    pages
        .iter()
        .map(|p| p.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap extracted document text in the summarization instruction.
pub fn pdf_summary_prompt(text: &str) -> String {
    format!("Extracted text from PDF:\n{}\n\nPlease summarize.", text)
}

/// Download a PDF, extract its text on the blocking pool, and return a single text part.
pub async fn normalize_pdf(
    source: &dyn MediaSource,
    extractor: Arc<dyn PdfTextExtractor>,
    attachment: &AttachmentRef,
) -> Result<RequestPart, MediaError> {
    let bytes = source
        .fetch(attachment)
        .await
        .map_err(MediaError::Download)?;
    let pages = tokio::task::spawn_blocking(move || extractor.page_texts(&bytes))
        .await
        .map_err(|e| MediaError::Task(e.to_string()))??;
    log::debug!("pdf: extracted {} page(s)", pages.len());
    Ok(RequestPart::text(pdf_summary_prompt(&join_page_texts(&pages))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticSource(Result<Vec<u8>, String>);

    #[async_trait]
    impl MediaSource for StaticSource {
        async fn fetch(&self, _attachment: &AttachmentRef) -> Result<Vec<u8>, String> {
            self.0.clone()
        }
    }

    struct FixedPages(Vec<Option<String>>);

    impl PdfTextExtractor for FixedPages {
        fn page_texts(&self, _data: &[u8]) -> Result<Vec<Option<String>>, MediaError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn join_keeps_empty_pages_as_blank_lines() {
        let pages = vec![
            Some("Hello".to_string()),
            Some(String::new()),
            Some("World".to_string()),
        ];
        assert_eq!(join_page_texts(&pages), "Hello\n\nWorld");
        let pages = vec![Some("Hello".to_string()), None, Some("World".to_string())];
        assert_eq!(join_page_texts(&pages), "Hello\n\nWorld");
    }

    #[tokio::test]
    async fn media_uses_declared_mime() {
        let source = StaticSource(Ok(vec![0xff, 0xd8]));
        let att = AttachmentRef::new("f", Some("audio/mpeg".to_string()));
        let part = normalize_media(&source, &att, MediaKind::Audio, default_mime(MediaKind::Audio))
            .await
            .unwrap();
        assert_eq!(
            part,
            RequestPart::Media {
                kind: MediaKind::Audio,
                mime_type: "audio/mpeg".to_string(),
                data: "/9g=".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn media_falls_back_to_default_mime() {
        let source = StaticSource(Ok(vec![1]));
        for (kind, mime) in [
            (MediaKind::Image, "image/jpeg"),
            (MediaKind::Audio, "audio/ogg"),
            (MediaKind::Video, "video/mp4"),
        ] {
            let att = AttachmentRef::new("f", Some("  ".to_string()));
            let part = normalize_media(&source, &att, kind, default_mime(kind))
                .await
                .unwrap();
            let RequestPart::Media { mime_type, .. } = part else {
                panic!("expected media part");
            };
            assert_eq!(mime_type, mime);
        }
    }

    #[tokio::test]
    async fn download_failure_propagates() {
        let source = StaticSource(Err("timeout".to_string()));
        let att = AttachmentRef::new("f", None);
        let err = normalize_media(&source, &att, MediaKind::Video, "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Download(ref m) if m == "timeout"));
    }

    #[tokio::test]
    async fn pdf_becomes_single_summary_prompt() {
        let source = StaticSource(Ok(b"%PDF-1.4".to_vec()));
        let extractor: Arc<dyn PdfTextExtractor> = Arc::new(FixedPages(vec![
            Some("Hello".to_string()),
            Some(String::new()),
            Some("World".to_string()),
        ]));
        let att = AttachmentRef::new("doc", Some(PDF_MIME.to_string()));
        let part = normalize_pdf(&source, extractor, &att).await.unwrap();
        assert_eq!(
            part.as_text(),
            Some("Extracted text from PDF:\nHello\n\nWorld\n\nPlease summarize.")
        );
    }

    /// In-memory PDF with one page per entry; `None` pages have an empty text block.
    fn build_pdf(pages: &[Option<&str>]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding"
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id }
        });
        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
            ];
            if let Some(t) = text {
                operations.push(Operation::new("Tj", vec![Object::string_literal(*t)]));
            }
            operations.push(Operation::new("ET", vec![]));
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()]
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn lopdf_extracts_text_page_by_page() {
        let pdf = build_pdf(&[Some("Hello"), None, Some("World")]);
        let pages = LopdfExtractor.page_texts(&pdf).unwrap();
        assert_eq!(
            pages,
            vec![
                Some("Hello".to_string()),
                Some(String::new()),
                Some("World".to_string())
            ]
        );
        assert_eq!(join_page_texts(&pages), "Hello\n\nWorld");
    }

    #[test]
    fn lopdf_rejects_non_pdf_bytes() {
        let err = LopdfExtractor.page_texts(b"not a pdf").unwrap_err();
        assert!(matches!(err, MediaError::Pdf(_)));
    }
}
