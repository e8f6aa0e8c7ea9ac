use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::types::{DocKind, DocMeta, Extracted};

const AV_EXTENSIONS: &[&str] = &[".mp3", ".mp4", ".m4a", ".wav", ".mov", ".mkv"];

const TEXT_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".markdown", ".csv", ".json", ".xml", ".log", ".py", ".js", ".css", ".sql",
];

/// Whether an upload should go to transcription instead of text extraction.
pub fn is_audio_video(filename: &str, mime: &str) -> bool {
    let name = filename.to_lowercase();
    mime.starts_with("audio/")
        || mime.starts_with("video/")
        || AV_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Turns uploaded file bytes into text. Must never fail: problems degrade to a
/// placeholder text with an `error` tag in the metadata.
pub trait Extractor: Send + Sync {
    fn extract(&self, bytes: &[u8], filename: &str, mime: &str) -> Extracted;
}

/// Built-in extractor: decodes text-like formats, converts HTML and reads PDF
/// text. Office formats and images get placeholders.
#[derive(Debug, Default, Clone)]
pub struct FileExtractor;

impl FileExtractor {
    fn meta(filename: &str, mime: &str, error: Option<String>) -> DocMeta {
        DocMeta {
            filename: filename.to_string(),
            mime: mime.to_string(),
            kind: DocKind::Doc,
            provider: Some("file".to_string()),
            error,
        }
    }

    /// Text of every page. Malformed files can make the parser panic, so the
    /// call is isolated and reported like any other failure.
    fn pdf_text(bytes: &[u8], filename: &str) -> (String, Option<String>) {
        let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
        match result {
            Ok(Ok(text)) if !text.trim().is_empty() => (text, None),
            Ok(Ok(_)) => (
                format!("[PDF {} - no text content found]", filename),
                Some("no_text_content".to_string()),
            ),
            Ok(Err(e)) => (
                format!("[PDF {} extraction failed: {}]", filename, e),
                Some(format!("extraction_failed: {}", e)),
            ),
            Err(_) => (
                format!("[PDF {} extraction failed: malformed document]", filename),
                Some("extraction_failed: malformed document".to_string()),
            ),
        }
    }
}

impl Extractor for FileExtractor {
    fn extract(&self, bytes: &[u8], filename: &str, mime: &str) -> Extracted {
        let name = filename.to_lowercase();
        let ends_with_any = |exts: &[&str]| exts.iter().any(|ext| name.ends_with(ext));

        let (text, error) = if ends_with_any(&[".html", ".htm"]) || mime == "text/html" {
            // Convert HTML to text; fall back to the raw markup
            let text = html2text::from_read(bytes, 120)
                .unwrap_or_else(|_| String::from_utf8_lossy(bytes).to_string());
            (text, None)
        } else if mime.starts_with("text/") || ends_with_any(TEXT_EXTENSIONS) {
            (String::from_utf8_lossy(bytes).to_string(), None)
        } else if name.ends_with(".pdf") || mime == "application/pdf" {
            Self::pdf_text(bytes, filename)
        } else if name.ends_with(".docx") {
            (
                format!("[DOCX {} extracted text placeholder]", filename),
                Some("unsupported_format".to_string()),
            )
        } else if ends_with_any(&[".pptx", ".ppt"]) {
            (
                format!("[PPTX {} extracted text placeholder]", filename),
                Some("unsupported_format".to_string()),
            )
        } else if ends_with_any(&[".png", ".jpg", ".jpeg"]) {
            (
                format!("[OCR {} placeholder]", filename),
                Some("unsupported_format".to_string()),
            )
        } else {
            let decoded = String::from_utf8_lossy(bytes);
            let printable = decoded
                .chars()
                .any(|c| !c.is_whitespace() && !c.is_control() && c != char::REPLACEMENT_CHARACTER);
            if printable {
                (format!("[Unknown file type: {}]\n{}", filename, decoded), None)
            } else {
                (
                    format!("[Binary file: {} - {} bytes]", filename, bytes.len()),
                    Some("binary_content".to_string()),
                )
            }
        };

        if let Some(err) = &error {
            debug!(filename, mime, error = %err, "extraction degraded to placeholder");
        }

        Extracted {
            text,
            meta: Self::meta(filename, mime, error),
        }
    }
}

/// One way of turning audio/video bytes into a transcript. May fail; the
/// chain decides what happens next.
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    fn transcribe<'a>(
        &'a self,
        bytes: &'a [u8],
        filename: &'a str,
        mime: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Audio/video collaborator with the same never-fail contract as [`Extractor`].
pub trait Transcriber: Send + Sync {
    fn transcribe<'a>(
        &'a self,
        bytes: &'a [u8],
        filename: &'a str,
        mime: &'a str,
    ) -> BoxFuture<'a, Extracted>;
}

/// Tries providers in order, each under its own timeout. The first success
/// wins; when all fail, the reasons are joined into a single error tag.
pub struct TranscriptionChain {
    providers: Vec<Arc<dyn TranscriptionProvider>>,
    attempt_timeout: Duration,
}

impl TranscriptionChain {
    pub fn new(providers: Vec<Arc<dyn TranscriptionProvider>>, attempt_timeout: Duration) -> Self {
        Self {
            providers,
            attempt_timeout,
        }
    }

    /// Append a provider to the end of the fallback order.
    pub fn with_provider(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// A chain with no providers; every transcription degrades to a placeholder.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::from_secs(0))
    }

    fn meta(filename: &str, mime: &str, provider: Option<&str>, error: Option<String>) -> DocMeta {
        DocMeta {
            filename: filename.to_string(),
            mime: mime.to_string(),
            kind: DocKind::Av,
            provider: provider.map(|p| p.to_string()),
            error,
        }
    }
}

impl Transcriber for TranscriptionChain {
    fn transcribe<'a>(
        &'a self,
        bytes: &'a [u8],
        filename: &'a str,
        mime: &'a str,
    ) -> BoxFuture<'a, Extracted> {
        Box::pin(async move {
            let mut failures: Vec<String> = Vec::new();

            for provider in &self.providers {
                let attempt = tokio::time::timeout(
                    self.attempt_timeout,
                    provider.transcribe(bytes, filename, mime),
                )
                .await;
                match attempt {
                    Ok(Ok(text)) => {
                        debug!(provider = provider.name(), filename, "transcription succeeded");
                        return Extracted {
                            text,
                            meta: Self::meta(filename, mime, Some(provider.name()), None),
                        };
                    }
                    Ok(Err(e)) => {
                        warn!(provider = provider.name(), filename, error = %e, "transcription attempt failed");
                        failures.push(format!("{}: {}", provider.name(), e));
                    }
                    Err(_) => {
                        warn!(provider = provider.name(), filename, "transcription attempt timed out");
                        failures.push(format!(
                            "{}: timed out after {:?}",
                            provider.name(),
                            self.attempt_timeout
                        ));
                    }
                }
            }

            let error = if failures.is_empty() {
                "no transcription provider configured".to_string()
            } else {
                failures.join("; ")
            };
            Extracted {
                text: format!("[Transcription unavailable for {}]", filename),
                meta: Self::meta(filename, mime, None, Some(error)),
            }
        })
    }
}
