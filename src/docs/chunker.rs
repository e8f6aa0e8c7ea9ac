/// Split text into chunks of at most `max_chars` characters on whitespace boundaries.
///
/// Tokens are joined with single spaces. A token longer than `max_chars` becomes
/// its own oversized chunk rather than being split mid-word. Text without any
/// tokens comes back unchanged as the only chunk, so the result is never empty.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    // Character length of `buf.join(" ")`
    let mut buf_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if !buf.is_empty() && buf_len + 1 + word_len > max_chars {
            out.push(buf.join(" "));
            buf.clear();
            buf_len = 0;
        }
        if !buf.is_empty() {
            buf_len += 1;
        }
        buf.push(word);
        buf_len += word_len;
    }
    if !buf.is_empty() {
        out.push(buf.join(" "));
    }

    if out.is_empty() {
        out.push(text.to_string());
    }
    out
}
