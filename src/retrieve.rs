use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::docs::types::Chunk;
use crate::embed::Embedder;
use crate::session::Corpus;

const LEXICAL_WEIGHT: f32 = 0.4;
const VECTOR_WEIGHT: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.to_string())
        .collect()
}

/// |A ∩ B| / max(1, |A ∪ B|)
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    inter as f32 / union.max(1) as f32
}

/// Plain inner product over the common length. Deliberately not
/// length-normalized: vector magnitude feeds into the score.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Hybrid relevance of one chunk: 0.4 * word-set jaccard + 0.6 * embedding dot product.
pub fn hybrid_score(
    query_words: &HashSet<String>,
    chunk_text: &str,
    query_vec: &[f32],
    chunk_vec: &[f32],
) -> f32 {
    let j = jaccard(query_words, &word_set(chunk_text));
    j * LEXICAL_WEIGHT + dot(query_vec, chunk_vec) * VECTOR_WEIGHT
}

/// The `k` most relevant chunks of a corpus, best first.
///
/// The sort is stable, so equal scores keep ingestion order. Chunks without a
/// vector are not eligible. `k == 0` or an empty corpus yields an empty list.
pub fn top_k(query: &str, corpus: &Corpus, embedder: &dyn Embedder, k: usize) -> Vec<ScoredChunk> {
    if k == 0 || corpus.chunks.is_empty() {
        return Vec::new();
    }

    let query_words = word_set(query);
    let query_vec = embedder.embed(query);

    let mut scored: Vec<ScoredChunk> = corpus
        .chunks
        .iter()
        .filter_map(|chunk| {
            let vec = corpus.vectors.get(&chunk.id)?;
            Some(ScoredChunk {
                score: hybrid_score(&query_words, &chunk.text, &query_vec, vec),
                chunk: chunk.clone(),
            })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(k);

    debug!(
        candidates = corpus.chunks.len(),
        returned = scored.len(),
        best = scored.first().map(|s| s.score),
        "retrieval scored"
    );
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::{DocMeta, DocumentRecord};

    /// Embeds everything to the same vector so only the lexical term differs.
    struct Flat;

    impl Embedder for Flat {
        fn dim(&self) -> usize {
            2
        }
        fn embed(&self, _text: &str) -> Vec<f32> {
            vec![0.5, 0.5]
        }
    }

    fn corpus_of(texts: &[&str], embedder: &dyn Embedder) -> Corpus {
        let mut corpus = Corpus::default();
        corpus.documents.insert(
            "d".into(),
            DocumentRecord {
                id: "d".into(),
                text: texts.join(" "),
                meta: DocMeta::plain("d.txt"),
            },
        );
        for (i, t) in texts.iter().enumerate() {
            let id = format!("c{}", i);
            corpus.vectors.insert(id.clone(), embedder.embed(t));
            corpus.chunks.push(Chunk {
                id,
                doc_id: "d".into(),
                text: t.to_string(),
                ordinal: i,
            });
        }
        corpus.ready = true;
        corpus
    }

    #[test]
    fn test_jaccard_guards_empty_union() {
        let empty = HashSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
        assert_eq!(jaccard(&word_set("a b"), &word_set("B c")), 1.0 / 3.0);
    }

    #[test]
    fn test_dot_uses_common_prefix_unnormalized() {
        assert_eq!(dot(&[1.0, 2.0, 3.0], &[4.0, 5.0]), 14.0);
        // Scaling one side scales the score: magnitude is not normalized away
        assert_eq!(dot(&[2.0, 4.0], &[1.0, 1.0]), 2.0 * dot(&[1.0, 2.0], &[1.0, 1.0]));
    }

    #[test]
    fn test_score_formula() {
        let q = word_set("Fox");
        let s = hybrid_score(&q, "the fox", &[1.0, 0.0], &[0.5, 9.0]);
        assert!((s - (0.5 * 0.4 + 0.5 * 0.6)).abs() < 1e-6);
    }

    #[test]
    fn test_lexical_match_ranks_first() {
        let corpus = corpus_of(&["cats sleep", "the quick brown fox", "rain falls"], &Flat);
        let hits = top_k("fox", &corpus, &Flat, 3);
        assert_eq!(hits[0].chunk.text, "the quick brown fox");
    }

    #[test]
    fn test_len_is_min_of_k_and_chunks() {
        let corpus = corpus_of(&["a", "b", "c"], &Flat);
        assert_eq!(top_k("a", &corpus, &Flat, 2).len(), 2);
        assert_eq!(top_k("a", &corpus, &Flat, 10).len(), 3);
        assert!(top_k("a", &corpus, &Flat, 0).is_empty());
        assert!(top_k("a", &Corpus::default(), &Flat, 5).is_empty());
    }

    #[test]
    fn test_sorted_non_increasing() {
        let embedder = crate::embed::HashEmbedder::new(32);
        let corpus = corpus_of(
            &["alpha beta", "beta gamma", "gamma delta", "delta alpha", "epsilon"],
            &embedder,
        );
        let hits = top_k("alpha gamma", &corpus, &embedder, 5);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_identical_text_keeps_ingestion_order() {
        let embedder = crate::embed::HashEmbedder::new(16);
        let corpus = corpus_of(&["same words", "other", "same words", "same words"], &embedder);
        let hits = top_k("same", &corpus, &embedder, 4);
        let dup_ordinals: Vec<usize> = hits
            .iter()
            .filter(|h| h.chunk.text == "same words")
            .map(|h| h.chunk.ordinal)
            .collect();
        assert_eq!(dup_ordinals, vec![0, 2, 3]);
    }

    #[test]
    fn test_chunk_without_vector_is_skipped() {
        let mut corpus = corpus_of(&["fox", "dog"], &Flat);
        corpus.vectors.remove("c0");
        let hits = top_k("fox", &corpus, &Flat, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "dog");
    }
}
