use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::conversation::{ConversationStore, ConversationSummary, Role};
use crate::docs::extract::{is_audio_video, Extractor, FileExtractor, Transcriber, TranscriptionChain};
use crate::docs::ingest::prepare_batch;
use crate::docs::types::{Citation, DocumentInput, IngestReport, Upload};
use crate::embed::{Embedder, HashEmbedder};
use crate::error::{PipelineError, Result};
use crate::llm::Generator;
use crate::pack::pack_context;
use crate::prompts;
use crate::retrieve::{top_k, ScoredChunk};
use crate::session::{Session, SessionId, SessionStore};

/// Shown to the user when retrieval finds nothing to ground an answer on.
pub const INSUFFICIENT_EVIDENCE_MESSAGE: &str =
    "I don't have enough information in the documents to answer that question.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub message: String,
    /// Defaults to `Config::default_top_k`.
    #[serde(default)]
    pub k: Option<usize>,
    /// Defaults to `Config::default_context_chars`.
    #[serde(default)]
    pub max_context_chars: Option<usize>,
    /// Bound the history block by characters instead of the last
    /// `Config::history_turns` turns.
    #[serde(default)]
    pub history_chars: Option<usize>,
    /// When false the query neither reads nor records conversation history.
    #[serde(default = "default_remember")]
    pub remember: bool,
}

fn default_remember() -> bool {
    true
}

impl QueryRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            k: None,
            max_context_chars: None,
            history_chars: None,
            remember: true,
        }
    }

    /// A one-off question outside the conversation.
    pub fn stateless(message: impl Into<String>) -> Self {
        Self {
            remember: false,
            ..Self::new(message)
        }
    }
}

/// A grounded answer in progress.
///
/// `tokens` must be polled to the end for the exchange to be recorded in
/// conversation memory; dropping it early abandons the turn without cleanup.
pub struct AnswerStream {
    pub citations: Vec<Citation>,
    pub hits: Vec<ScoredChunk>,
    pub tokens: BoxStream<'static, String>,
}

pub enum QueryOutcome {
    /// Retrieval found nothing; the generator was not called.
    InsufficientEvidence,
    Answer(AnswerStream),
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("citations", &self.citations)
            .field("hits", &self.hits)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for QueryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientEvidence => f.write_str("InsufficientEvidence"),
            Self::Answer(a) => f.debug_tuple("Answer").field(a).finish(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub summary: String,
    /// Document ids in ingestion order.
    pub sources: Vec<String>,
}

/// The serving component: owns the session and conversation stores and the
/// collaborators, and exposes the session lifecycle surface to a router.
pub struct RagPipeline {
    config: Config,
    sessions: Arc<SessionStore>,
    conversations: Arc<ConversationStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn Extractor>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn Generator>,
}

impl RagPipeline {
    /// Fresh stores, the hash embedder at `config.embed_dim`, the built-in file
    /// extractor and a transcription chain with no providers yet.
    pub fn new(config: Config, generator: Arc<dyn Generator>) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(config.session_ttl)),
            conversations: Arc::new(ConversationStore::new(config.memory_max_turns)),
            embedder: Arc::new(HashEmbedder::new(config.embed_dim)),
            extractor: Arc::new(FileExtractor),
            transcriber: Arc::new(TranscriptionChain::new(Vec::new(), config.transcribe_timeout)),
            generator,
            config,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    pub async fn open_session(&self) -> SessionId {
        self.sessions.create().await
    }

    /// Live session lookup. A session found expired takes its conversation
    /// memory with it.
    async fn live_session(&self, session_id: &str) -> Result<Arc<Session>> {
        let result = self.sessions.get(session_id).await;
        if let Err(PipelineError::SessionExpired(_)) = &result {
            self.conversations.remove(session_id).await;
        }
        result
    }

    /// Evict every expired session with its conversation, then drop any
    /// memory older than the session TTL. Returns the evicted session count.
    pub async fn purge_expired(&self) -> usize {
        let expired = self.sessions.purge_expired().await;
        for id in &expired {
            self.conversations.remove(id).await;
        }
        // A memory is never older than its session
        if let Ok(max_age) = chrono::Duration::from_std(self.config.session_ttl) {
            self.conversations.prune_older_than(max_age).await;
        }
        expired.len()
    }

    /// Delete the session and its conversation. Idempotent.
    pub async fn close_session(&self, session_id: &str) {
        self.sessions.delete(session_id).await;
        self.conversations.remove(session_id).await;
    }

    /// Chunk, embed and index already-extracted texts. The batch is prepared
    /// without holding any lock and appended in one step.
    pub async fn ingest(&self, session_id: &str, inputs: Vec<DocumentInput>) -> Result<IngestReport> {
        // Fail fast on a dead session before doing the work
        self.live_session(session_id).await?;

        let (batch, added) = prepare_batch(inputs, self.config.chunk_max_chars, self.embedder.as_ref());
        let new_chunks = batch.chunks.len();
        let total_chunks = match self.sessions.append_ingestion(session_id, batch).await {
            Err(PipelineError::SessionExpired(id)) => {
                self.conversations.remove(&id).await;
                return Err(PipelineError::SessionExpired(id));
            }
            other => other?,
        };

        info!(
            session_id,
            documents = added.len(),
            new_chunks,
            total_chunks,
            "documents ingested"
        );
        Ok(IngestReport { added, total_chunks })
    }

    /// Accept raw files: size check first, then extraction or transcription,
    /// then [`Self::ingest`]. Collaborator problems never fail the upload.
    pub async fn upload(&self, session_id: &str, uploads: Vec<Upload>) -> Result<IngestReport> {
        self.live_session(session_id).await?;
        if uploads.is_empty() {
            return Err(PipelineError::NoFiles);
        }

        let size: u64 = uploads.iter().map(|u| u.bytes.len() as u64).sum();
        let limit = self.config.max_upload_bytes();
        if size > limit {
            warn!(session_id, size, limit, "upload rejected: payload too large");
            return Err(PipelineError::PayloadTooLarge { size, limit });
        }

        let mut inputs = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            let extracted = if is_audio_video(&upload.filename, &upload.mime) {
                self.transcriber
                    .transcribe(&upload.bytes, &upload.filename, &upload.mime)
                    .await
            } else {
                self.extractor
                    .extract(&upload.bytes, &upload.filename, &upload.mime)
            };
            if let Some(error) = &extracted.meta.error {
                warn!(session_id, filename = %upload.filename, error = %error, "extraction degraded");
            }
            inputs.push(DocumentInput {
                filename: upload.filename.clone(),
                text: extracted.text,
                meta: Some(extracted.meta),
            });
        }

        self.ingest(session_id, inputs).await
    }

    /// Retrieve, pack and start generating an answer.
    ///
    /// The session's corpus is read under a guard that is released before the
    /// generator is called. When the token stream finishes, the user turn
    /// (with citations) and the assistant turn are committed together. A
    /// generator failure becomes a visible `Error: ...` token and the partial
    /// answer is still committed. Nothing is committed if the session was
    /// closed or expired while streaming, or when `remember` is off.
    pub async fn query(&self, session_id: &str, request: QueryRequest) -> Result<QueryOutcome> {
        let session = self.live_session(session_id).await?;
        let k = request.k.unwrap_or(self.config.default_top_k);
        let budget = request
            .max_context_chars
            .unwrap_or(self.config.default_context_chars);

        let (hits, citations) = {
            let corpus = session.read().await;
            if !corpus.ready {
                return Err(PipelineError::NotReady);
            }
            let hits = top_k(&request.message, &corpus, self.embedder.as_ref(), k);
            let citations: Vec<Citation> = hits
                .iter()
                .map(|h| Citation {
                    doc_id: h.chunk.doc_id.clone(),
                    filename: corpus
                        .documents
                        .get(&h.chunk.doc_id)
                        .map(|d| d.meta.filename.clone())
                        .unwrap_or_default(),
                    chunk: h.chunk.ordinal,
                })
                .collect();
            (hits, citations)
        };

        if hits.is_empty() {
            info!(session_id, k, "insufficient evidence for query");
            return Ok(QueryOutcome::InsufficientEvidence);
        }

        let context = pack_context(&hits, budget);
        let history = match (request.remember, request.history_chars) {
            (false, _) => String::new(),
            (true, Some(max_chars)) => {
                self.conversations
                    .history_context(session_id, max_chars)
                    .await
            }
            (true, None) => {
                self.conversations
                    .recent_context(session_id, self.config.history_turns)
                    .await
            }
        };
        debug!(
            session_id,
            hits = hits.len(),
            context_chars = context.chars().count(),
            history_chars = history.chars().count(),
            "prompt assembled"
        );

        let mut upstream = self
            .generator
            .stream_answer(&request.message, &context, &history);
        let sessions = self.sessions.clone();
        let conversations = self.conversations.clone();
        let remember = request.remember;
        let session_id = session_id.to_string();
        let question = request.message;
        let sources = citations.clone();

        let tokens = async_stream::stream! {
            let mut answer = String::new();
            while let Some(item) = upstream.next().await {
                match item {
                    Ok(token) => {
                        answer.push_str(&token);
                        yield token;
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "generation failed mid-stream");
                        let message = format!("Error: {}", e);
                        if !answer.is_empty() {
                            answer.push('\n');
                        }
                        answer.push_str(&message);
                        yield message;
                        break;
                    }
                }
            }

            if remember {
                // Only an existing memory of a live session is written to;
                // close_session may have run while tokens were streaming.
                match sessions.get(&session_id).await {
                    Ok(_) => match conversations.get(&session_id).await {
                        Some(memory) => {
                            let mut memory = memory.lock().await;
                            memory.append(Role::User, question, Some(sources));
                            memory.append(Role::Assistant, answer.trim(), None);
                            debug!(session_id = %session_id, turns = memory.len(), "exchange recorded");
                        }
                        None => debug!(session_id = %session_id, "conversation gone; exchange dropped"),
                    },
                    Err(e) => {
                        conversations.remove(&session_id).await;
                        debug!(session_id = %session_id, reason = %e, "session gone; exchange dropped");
                    }
                }
            }
        };

        Ok(QueryOutcome::Answer(AnswerStream {
            citations,
            hits,
            tokens: Box::pin(tokens),
        }))
    }

    /// Brief over the first characters of every document, collected in one go.
    pub async fn summarize(&self, session_id: &str, mode: &str) -> Result<SummaryReport> {
        let session = self.live_session(session_id).await?;

        let (prompt, sources) = {
            let corpus = session.read().await;
            if !corpus.ready || corpus.documents.is_empty() {
                return Err(PipelineError::NotReady);
            }
            // Documents in ingestion order, taken from their first chunks
            let mut sources: Vec<String> = Vec::new();
            for chunk in &corpus.chunks {
                if !sources.contains(&chunk.doc_id) {
                    sources.push(chunk.doc_id.clone());
                }
            }
            let prompt = prompts::summary_prompt(
                mode,
                sources.iter().filter_map(|id| {
                    corpus
                        .documents
                        .get(id)
                        .map(|d| (id.as_str(), d.text.as_str()))
                }),
            );
            (prompt, sources)
        };

        let mut tokens = self.generator.generate(prompt);
        let mut summary = String::new();
        while let Some(item) = tokens.next().await {
            match item {
                Ok(token) => summary.push_str(&token),
                Err(e) => {
                    warn!(session_id, error = %e, "summary generation failed");
                    summary.push_str(&format!("Error: {}", e));
                    break;
                }
            }
        }

        info!(session_id, mode, documents = sources.len(), "summary generated");
        Ok(SummaryReport {
            summary: summary.trim().to_string(),
            sources,
        })
    }

    pub async fn clear_conversation(&self, session_id: &str) {
        self.conversations.clear(session_id).await;
    }

    pub async fn conversation_summary(&self, session_id: &str) -> ConversationSummary {
        self.conversations.summary(session_id).await
    }
}
