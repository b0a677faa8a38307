//! Helpers for text cleanup, passage chunking, logging and file system checks.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*").unwrap());

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a char boundary)
/// with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the generator hits its output token limit the JSON array is cut
/// off mid-way and fails with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Collapse runs of whitespace (including newlines and NBSP) into one space.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

/// Remove Markdown code fences (```` ```json ```` / ```` ``` ````) that
/// generators like to wrap JSON in.
pub fn strip_code_fences(s: &str) -> String {
    CODE_FENCE.replace_all(s, "").trim().to_string()
}

pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Pack paragraphs greedily into passages.
///
/// A passage is closed when adding the next paragraph would push it past
/// `chunk_words` and it already holds more than `min_chunk_words` words, so
/// a single long paragraph may overshoot `chunk_words`. Paragraphs inside a
/// passage are joined with a blank line.
pub fn chunk_paragraphs<S: AsRef<str>>(
    paragraphs: &[S],
    chunk_words: usize,
    min_chunk_words: usize,
) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut words = 0;

    for p in paragraphs {
        let p = p.as_ref();
        let len = word_count(p);
        if words + len > chunk_words && words > min_chunk_words {
            chunks.push(current.join("\n\n"));
            current = vec![p];
            words = len;
        } else {
            current.push(p);
            words += len;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

/// Ensure a directory exists, creating it and any missing parents.
///
/// Nothing is written into the directory. Writability is established by the
/// staged write that follows.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    info!("Output directory ready");
    Ok(())
}
