pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Use ONLY the provided document context to answer questions. If the context doesn't contain enough information to answer, say so clearly.";

const ANSWER_INSTRUCTIONS: &str = "Please provide a helpful, well-structured response based on the documents. Do not include citations or source references in your response.";

const CONVERSATIONAL_INSTRUCTIONS: &str = "Please provide a helpful, well-structured response based on the documents and conversation context. Be conversational and reference previous parts of our conversation when relevant. Do not include citations or source references in your response.";

/// Characters of each document included in a summary prompt.
pub const SUMMARY_EXCERPT_CHARS: usize = 600;

/// Compose the answer prompt. The history block is left out entirely when
/// there is no prior conversation.
pub fn answer_prompt(question: &str, context: &str, history: &str) -> String {
    if history.trim().is_empty() {
        format!(
            "{SYSTEM_PROMPT}\n\nDOCUMENT CONTEXT:\n{context}\n\nCurrent Question: {question}\n\n{ANSWER_INSTRUCTIONS}"
        )
    } else {
        format!(
            "{SYSTEM_PROMPT}\n\nDOCUMENT CONTEXT:\n{context}\n\nCONVERSATION HISTORY:\n{history}\n\nCurrent Question: {question}\n\n{CONVERSATIONAL_INSTRUCTIONS}"
        )
    }
}

/// Compose a summarization prompt over `(doc_id, text)` pairs; each text is
/// cut to its first [`SUMMARY_EXCERPT_CHARS`] characters.
pub fn summary_prompt<'a>(mode: &str, docs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let parts: Vec<String> = docs
        .into_iter()
        .map(|(id, text)| {
            let excerpt: String = text.chars().take(SUMMARY_EXCERPT_CHARS).collect();
            format!("[{}] {}", id, excerpt)
        })
        .collect();
    format!(
        "Summarize the following documents into a concise {} brief with bullet action items.\n\n{}",
        mode,
        parts.join("\n\n")
    )
}
