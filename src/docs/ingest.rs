use tracing::debug;

use super::chunker::chunk_text;
use super::types::{AddedDoc, Chunk, ChunkId, DocMeta, DocumentInput, DocumentRecord};
use crate::embed::Embedder;

/// Everything one ingestion adds to a session, prepared outside any lock and
/// appended in one step by [`crate::session::SessionStore::append_ingestion`].
#[derive(Debug, Default)]
pub struct IngestBatch {
    pub documents: Vec<DocumentRecord>,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<(ChunkId, Vec<f32>)>,
}

/// Chunk and embed a set of documents. Every chunk gets its vector here, so a
/// batch is always self-consistent before it reaches the store.
pub fn prepare_batch(
    inputs: Vec<DocumentInput>,
    max_chars: usize,
    embedder: &dyn Embedder,
) -> (IngestBatch, Vec<AddedDoc>) {
    let mut batch = IngestBatch::default();
    let mut added = Vec::with_capacity(inputs.len());

    for input in inputs {
        let doc_id = uuid::Uuid::new_v4().to_string();
        let pieces = chunk_text(&input.text, max_chars);
        debug!(doc_id = %doc_id, filename = %input.filename, chunks = pieces.len(), "document chunked");

        for (ordinal, piece) in pieces.into_iter().enumerate() {
            let chunk_id = uuid::Uuid::new_v4().to_string();
            batch.vectors.push((chunk_id.clone(), embedder.embed(&piece)));
            batch.chunks.push(Chunk {
                id: chunk_id,
                doc_id: doc_id.clone(),
                text: piece,
                ordinal,
            });
        }

        added.push(AddedDoc {
            doc_id: doc_id.clone(),
            filename: input.filename.clone(),
            len: input.text.chars().count(),
        });
        let meta = input
            .meta
            .unwrap_or_else(|| DocMeta::plain(&input.filename));
        batch.documents.push(DocumentRecord {
            id: doc_id,
            text: input.text,
            meta,
        });
    }

    (batch, added)
}
