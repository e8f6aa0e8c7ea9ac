/// Maps text to a fixed-length vector. Implementations must be deterministic:
/// the same input always yields the same vector within one process.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Stable, content-addressed toy embedding: the blake3 output stream of the
/// input, read as little-endian `u32` words and scaled into `[0, 1/sqrt(dim))`.
///
/// Not semantically meaningful. The scale keeps an unnormalized dot product of
/// two vectors in roughly the same range as a jaccard score, whatever `dim` is.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut bytes = vec![0u8; self.dim * 4];
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        hasher.finalize_xof().fill(&mut bytes);

        let scale = 1.0 / (self.dim.max(1) as f64).sqrt();
        bytes
            .chunks_exact(4)
            .map(|w| {
                let word = u32::from_le_bytes([w[0], w[1], w[2], w[3]]);
                (word as f64 / 4_294_967_296.0 * scale) as f32
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_has_configured_dim() {
        assert_eq!(HashEmbedder::new(1024).embed("hello").len(), 1024);
        assert_eq!(HashEmbedder::new(8).embed("").len(), 8);
        assert!(HashEmbedder::new(0).embed("x").is_empty());
    }

    #[test]
    fn test_embedding_is_deterministic() {
        let e = HashEmbedder::new(64);
        assert_eq!(e.embed("the quick brown fox"), e.embed("the quick brown fox"));
        assert_eq!(
            HashEmbedder::new(64).embed("same"),
            HashEmbedder::new(64).embed("same")
        );
    }

    #[test]
    fn test_distinct_inputs_differ() {
        let e = HashEmbedder::new(16);
        assert_ne!(e.embed("fox"), e.embed("fox "));
        assert_ne!(e.embed("a"), e.embed("b"));
    }

    #[test]
    fn test_values_within_scaled_range() {
        let dim = 256;
        let bound = 1.0001 / (dim as f32).sqrt();
        for v in HashEmbedder::new(dim).embed("range check") {
            assert!((0.0..=bound).contains(&v), "{} out of range", v);
        }
    }
}
