pub mod chunker;
pub mod extract;
pub mod ingest;
pub mod types;

pub use chunker::chunk_text;
pub use extract::{Extractor, FileExtractor, Transcriber, TranscriptionChain, TranscriptionProvider};
pub use ingest::{prepare_batch, IngestBatch};
