//! Text preparation and chunking ahead of speech synthesis.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

/// Known upstream limit on a single synthesis request.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1000;

lazy_static! {
    static ref MARKUP: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref SPACE_RUNS: Regex = Regex::new(r"[ \t]+").unwrap();
}

/// Cleans script text before synthesis: strips markup tags, decodes the
/// common HTML entities, and collapses runs of spaces. Newlines survive;
/// the chunker treats them as sentence boundaries.
pub fn prepare_for_synthesis(text: &str) -> String {
    let text = MARKUP.replace_all(text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&apos;", "'");
    SPACE_RUNS.replace_all(&text, " ").trim().to_string()
}

/// Splits `text` into sentence-aligned chunks of at most `max_chars`
/// characters each.
///
/// Sentences end at terminal punctuation (Japanese or Latin) or a newline;
/// the terminator stays with its sentence. Sentences are then packed
/// greedily: when the next one would overflow the current chunk, the chunk
/// is closed and a new one starts. A single sentence longer than `max_chars`
/// is kept intact in its own oversized chunk; the upstream service may or
/// may not accept it, but splitting mid-sentence reads worse.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.chars().count() <= max_chars {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(trimmed) {
        let sentence_len = sentence.chars().count();
        if sentence_len > max_chars {
            warn!(
                "sentence of {} chars exceeds the {} char chunk limit; keeping it whole",
                sentence_len, max_chars
            );
        }
        if current_len == 0 {
            current = sentence;
            current_len = sentence_len;
        } else if current_len + sentence_len <= max_chars {
            current.push_str(&sentence);
            current_len += sentence_len;
        } else {
            chunks.push(current);
            current = sentence;
            current_len = sentence_len;
        }
    }
    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

/// Splits on sentence-terminal punctuation and newlines, keeping each
/// terminator with the preceding sentence.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '。' | '．' | '！' | '？' | '.' | '!' | '?' | '\n') {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}
