//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into [`Chunk`]s that respect a
//! configurable `max_tokens` limit. Splitting occurs on paragraph
//! boundaries (`\n\n`) to preserve semantic coherence within each chunk.
//!
//! Chunk ids are deterministic functions of `(document path, chunk index)`
//! so a re-ingested document produces the same id sequence and can locate
//! its prior records in the vector index. A document with no extractable
//! text yields an empty chunk list.

use crate::hash::fingerprint;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A segment of extracted text, the unit that gets embedded and indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub path: String,
    pub chunk_index: i64,
    pub text: String,
}

/// Deterministic record id for `(path, index)`.
///
/// The path component is a digest prefix rather than the raw path so ids
/// stay short and never collide across directories with equal file stems.
pub fn chunk_id(path: &str, index: i64) -> String {
    format!("{}#{:04}", &fingerprint(path.as_bytes())[..16], index)
}

/// Split text into chunks on paragraph boundaries, respecting max_tokens.
/// Returns chunks with contiguous indices starting at 0; empty or
/// whitespace-only text returns no chunks.
pub fn chunk_text(path: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    if text.trim().is_empty() {
        return Vec::new();
    }

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: i64 = 0;

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(path, chunk_index, &current_buf));
            chunk_index += 1;
            current_buf.clear();
        }

        // A single oversized paragraph gets hard-split at word boundaries
        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(make_chunk(path, chunk_index, &current_buf));
                chunk_index += 1;
                current_buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                // max_chars is a byte offset; back up to a char boundary so
                // multibyte text never splits mid-character
                let mut split_at = remaining.len().min(max_chars);
                while split_at > 0 && !remaining.is_char_boundary(split_at) {
                    split_at -= 1;
                }
                if split_at == 0 {
                    split_at = remaining
                        .chars()
                        .next()
                        .map(|c| c.len_utf8())
                        .unwrap_or(remaining.len());
                }
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = remaining[..actual_split].trim();
                if !piece.is_empty() {
                    chunks.push(make_chunk(path, chunk_index, piece));
                    chunk_index += 1;
                }
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(path, chunk_index, &current_buf));
    }

    chunks
}

fn make_chunk(path: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: chunk_id(path, index),
        path: path.to_string(),
        chunk_index: index,
        text: text.to_string(),
    }
}
