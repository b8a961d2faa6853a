//! Word-window chunker for storage-friendly message sizes.
//!
//! Text is split on whitespace and emitted as windows of at most
//! `max_words` words. Consecutive windows share `overlap` words. The
//! effective overlap is clamped to `max_words - 1`, so each window starts at
//! least one word after the previous one and the loop always terminates.

/// Default window size used when saving an exchange.
pub const DEFAULT_MAX_WORDS: usize = 200;

/// Default overlap between consecutive windows.
pub const DEFAULT_OVERLAP: usize = 30;

/// Split `text` into overlapping word windows.
///
/// Empty or whitespace-only input yields no chunks. `max_words == 0` is
/// treated as 1.
pub fn chunk(text: &str, max_words: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let max_words = max_words.max(1);
    let overlap = effective_overlap(max_words, overlap);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// Overlap actually applied for a window of `max_words`.
pub fn effective_overlap(max_words: usize, overlap: usize) -> usize {
    overlap.min(max_words.max(1) - 1)
}
