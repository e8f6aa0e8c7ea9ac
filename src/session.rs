use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::docs::ingest::IngestBatch;
use crate::docs::types::{Chunk, ChunkId, DocId, DocumentRecord};
use crate::error::{PipelineError, Result};

pub type SessionId = String;

/// A session's documents and derived index. Append-only; mutated only by ingestion.
#[derive(Debug, Default)]
pub struct Corpus {
    pub documents: HashMap<DocId, DocumentRecord>,
    /// Ingestion order.
    pub chunks: Vec<Chunk>,
    pub vectors: HashMap<ChunkId, Vec<f32>>,
    /// False until the first ingestion completes.
    pub ready: bool,
}

impl Corpus {
    fn append(&mut self, batch: IngestBatch) {
        let IngestBatch {
            documents,
            chunks,
            vectors,
        } = batch;
        for doc in documents {
            self.documents.insert(doc.id.clone(), doc);
        }
        self.vectors.extend(vectors);
        for chunk in chunks {
            debug_assert!(self.documents.contains_key(&chunk.doc_id));
            debug_assert!(self.vectors.contains_key(&chunk.id));
            self.chunks.push(chunk);
        }
        self.ready = true;
    }
}

/// One isolated, time-bounded workspace.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    started: Instant,
    corpus: RwLock<Corpus>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            started: Instant::now(),
            corpus: RwLock::new(Corpus::default()),
        }
    }

    /// Age measured on the monotonic clock.
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Consistent view of the corpus as of the last completed ingestion.
    /// Hold the guard only for in-memory work; never across a generator call.
    pub async fn read(&self) -> RwLockReadGuard<'_, Corpus> {
        self.corpus.read().await
    }

    pub async fn is_ready(&self) -> bool {
        self.corpus.read().await.ready
    }
}

/// Owns every live session. Expiry is lazy: checked on [`SessionStore::get`].
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self) -> SessionId {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone()));
        self.sessions.write().await.insert(id.clone(), session);
        info!(session_id = %id, "session created");
        id
    }

    /// Look up a live session. An expired session is removed as a side effect
    /// and reported as [`PipelineError::SessionExpired`]; after that the id is
    /// simply [`PipelineError::SessionNotFound`].
    pub async fn get(&self, id: &str) -> Result<Arc<Session>> {
        {
            let sessions = self.sessions.read().await;
            let Some(session) = sessions.get(id) else {
                return Err(PipelineError::SessionNotFound(id.to_string()));
            };
            if !session.is_expired(self.ttl) {
                return Ok(session.clone());
            }
        }

        // Expired: only the caller that actually evicts it reports the expiry
        if self.sessions.write().await.remove(id).is_none() {
            return Err(PipelineError::SessionNotFound(id.to_string()));
        }
        info!(session_id = %id, "session expired");
        Err(PipelineError::SessionExpired(id.to_string()))
    }

    /// Idempotent.
    pub async fn delete(&self, id: &str) {
        if self.sessions.write().await.remove(id).is_some() {
            info!(session_id = %id, "session deleted");
        }
    }

    /// Append a whole ingestion batch under one write guard and mark the
    /// session ready. Returns the session's total chunk count afterwards.
    pub async fn append_ingestion(&self, id: &str, batch: IngestBatch) -> Result<usize> {
        let session = self.get(id).await?;
        let added = batch.chunks.len();
        let mut corpus = session.corpus.write().await;
        corpus.append(batch);
        debug!(session_id = %id, added, total = corpus.chunks.len(), "ingestion appended");
        Ok(corpus.chunks.len())
    }

    /// Drop every expired session now and return their ids. Observable `get`
    /// behaviour is the same as lazy expiry except that the id reports
    /// `NotFound` instead of `Expired`.
    pub async fn purge_expired(&self) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(self.ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            info!(purged = expired.len(), "expired sessions purged");
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::DocMeta;

    fn batch_for(doc_id: &str, texts: &[&str]) -> IngestBatch {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                id: format!("{}-{}", doc_id, i),
                doc_id: doc_id.to_string(),
                text: t.to_string(),
                ordinal: i,
            })
            .collect();
        let vectors = chunks.iter().map(|c| (c.id.clone(), vec![0.5, 0.5])).collect();
        IngestBatch {
            documents: vec![DocumentRecord {
                id: doc_id.to_string(),
                text: texts.join(" "),
                meta: DocMeta::plain("doc.txt"),
            }],
            chunks,
            vectors,
        }
    }

    #[tokio::test]
    async fn test_get_after_create_succeeds() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.id, id);
        assert!(!session.is_ready().await);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert_eq!(
            store.get("nope").await.unwrap_err(),
            PipelineError::SessionNotFound("nope".into())
        );
    }

    #[tokio::test]
    async fn test_expired_then_not_found() {
        let store = SessionStore::new(Duration::from_millis(20));
        let id = store.create().await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(
            store.get(&id).await.unwrap_err(),
            PipelineError::SessionExpired(id.clone())
        );
        // Lazy expiry removed it
        assert_eq!(
            store.get(&id).await.unwrap_err(),
            PipelineError::SessionNotFound(id.clone())
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        store.delete(&id).await;
        store.delete(&id).await;
        assert_eq!(
            store.get(&id).await.unwrap_err(),
            PipelineError::SessionNotFound(id)
        );
    }

    #[tokio::test]
    async fn test_held_handle_survives_expiry() {
        let store = SessionStore::new(Duration::from_millis(20));
        let id = store.create().await;
        let held = store.get(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.get(&id).await.is_err());
        // In-flight readers keep working on their handle
        assert_eq!(held.read().await.chunks.len(), 0);
    }

    #[tokio::test]
    async fn test_append_marks_ready_and_keeps_order() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create().await;
        assert_eq!(store.append_ingestion(&id, batch_for("d1", &["a", "b"])).await.unwrap(), 2);
        assert_eq!(store.append_ingestion(&id, batch_for("d2", &["c"])).await.unwrap(), 3);

        let session = store.get(&id).await.unwrap();
        let corpus = session.read().await;
        assert!(corpus.ready);
        let texts: Vec<&str> = corpus.chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(corpus.documents.len(), 2);
        for chunk in &corpus.chunks {
            assert!(corpus.vectors.contains_key(&chunk.id));
        }
    }

    #[tokio::test]
    async fn test_append_to_missing_session_fails() {
        let store = SessionStore::new(Duration::from_secs(60));
        let err = store.append_ingestion("ghost", batch_for("d", &["x"])).await.unwrap_err();
        assert_eq!(err, PipelineError::SessionNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_see_chunk_without_vector() {
        let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
        let id = store.create().await;

        let writer = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for n in 0..50 {
                    let doc = format!("doc{}", n);
                    store
                        .append_ingestion(&id, batch_for(&doc, &["one", "two", "three"]))
                        .await
                        .unwrap();
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let id = id.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let session = store.get(&id).await.unwrap();
                    let corpus = session.read().await;
                    assert_eq!(corpus.chunks.len() % 3, 0);
                    for chunk in &corpus.chunks {
                        assert!(corpus.vectors.contains_key(&chunk.id));
                        assert!(corpus.documents.contains_key(&chunk.doc_id));
                    }
                    drop(corpus);
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
        let session = store.get(&id).await.unwrap();
        assert_eq!(session.read().await.chunks.len(), 150);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = SessionStore::new(Duration::from_millis(20));
        store.create().await;
        store.create().await;
        assert_eq!(store.len().await, 2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.purge_expired().await.len(), 2);
        assert!(store.is_empty().await);
        assert!(store.purge_expired().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_gets_report_expiry_once() {
        let store = SessionStore::new(Duration::from_millis(20));
        let id = store.create().await;
        tokio::time::sleep(Duration::from_millis(60)).await;

        let (a, b) = tokio::join!(store.get(&id), store.get(&id));
        let errors = [a.unwrap_err(), b.unwrap_err()];
        let expired = errors
            .iter()
            .filter(|e| matches!(e, PipelineError::SessionExpired(_)))
            .count();
        assert_eq!(expired, 1);
        assert!(errors.contains(&PipelineError::SessionNotFound(id.clone())));
    }
}
