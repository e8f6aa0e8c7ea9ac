use crate::retrieve::ScoredChunk;

/// Serialize ranked chunks into one context string of at most `budget_chars`
/// characters. Each chunk becomes `"[Source {rank}]\n{text}\n"`.
///
/// Packing stops at the first segment that would overflow the budget; a later,
/// shorter chunk is never substituted in, so source numbers stay contiguous.
pub fn pack_context(ranked: &[ScoredChunk], budget_chars: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;

    for (i, hit) in ranked.iter().enumerate() {
        let segment = format!("[Source {}]\n{}\n", i + 1, hit.chunk.text);
        let len = segment.chars().count();
        if used + len > budget_chars {
            break;
        }
        out.push_str(&segment);
        used += len;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::Chunk;

    fn hits(texts: &[&str]) -> Vec<ScoredChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| ScoredChunk {
                chunk: Chunk {
                    id: format!("c{}", i),
                    doc_id: "d".into(),
                    text: t.to_string(),
                    ordinal: i,
                },
                score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    #[test]
    fn test_empty_input_is_empty_string() {
        assert_eq!(pack_context(&[], 100), "");
        assert_eq!(pack_context(&[], 0), "");
    }

    #[test]
    fn test_segments_are_labeled_by_rank() {
        let out = pack_context(&hits(&["first", "second"]), 1000);
        assert_eq!(out, "[Source 1]\nfirst\n[Source 2]\nsecond\n");
    }

    #[test]
    fn test_stops_at_first_overflow() {
        // Segment 1 is 17 chars, segment 2 is 62, segment 3 is 13
        let long = "x".repeat(50);
        let ranked = hits(&["alpha", long.as_str(), "b"]);
        let out = pack_context(&ranked, 40);
        assert_eq!(out, "[Source 1]\nalpha\n");
        assert!(!out.contains("[Source 3]"));
    }

    #[test]
    fn test_result_never_exceeds_budget() {
        let ranked = hits(&["one two", "three four five", "six", "seven eight"]);
        for budget in 0..80 {
            let out = pack_context(&ranked, budget);
            assert!(out.chars().count() <= budget, "budget {} exceeded", budget);
        }
    }

    #[test]
    fn test_first_segment_too_large_yields_empty() {
        assert_eq!(pack_context(&hits(&["hello"]), 5), "");
    }
}
