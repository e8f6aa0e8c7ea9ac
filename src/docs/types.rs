use serde::{Deserialize, Serialize};

/// Random (UUID v4) document ID, unique within the process.
pub type DocId = String;

/// Random (UUID v4) chunk ID, unique within the process.
pub type ChunkId = String;

/// Whether a document came through text extraction or transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    Doc,
    /// Audio/video, transcribed.
    Av,
}

/// Extraction metadata stored alongside a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub filename: String,
    pub mime: String,
    pub kind: DocKind,
    /// Which collaborator produced the text, e.g. "file" or a transcription provider name.
    #[serde(default)]
    pub provider: Option<String>,
    /// Set when extraction degraded to placeholder text.
    #[serde(default)]
    pub error: Option<String>,
}

impl DocMeta {
    pub fn plain(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            mime: "text/plain".to_string(),
            kind: DocKind::Doc,
            provider: None,
            error: None,
        }
    }
}

/// Output of the extraction/transcription collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub meta: DocMeta,
}

/// A document as held by a session.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: DocId,
    pub text: String,
    pub meta: DocMeta,
}

/// A contiguous slice of a document's text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: DocId,
    pub text: String,
    /// 0-based position within the source document. Display only.
    pub ordinal: usize,
}

/// Points an answer back at the chunk it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub doc_id: DocId,
    pub filename: String,
    pub chunk: usize,
}

/// Text handed to ingestion along with the filename used for citations.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub filename: String,
    pub text: String,
    pub meta: Option<DocMeta>,
}

impl DocumentInput {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
            meta: None,
        }
    }
}

/// Raw file bytes as received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Per-document line of an ingestion report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedDoc {
    pub doc_id: DocId,
    pub filename: String,
    /// Character length of the ingested text.
    pub len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub added: Vec<AddedDoc>,
    /// Total chunks in the session after this ingestion.
    pub total_chunks: usize,
}
