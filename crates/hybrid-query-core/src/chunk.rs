//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into spans that respect a character
//! budget. Splitting occurs on blank-line paragraph boundaries to keep each
//! chunk semantically coherent.
//!
//! # Algorithm
//!
//! 1. Split text on blank lines (`\n\n`, tolerating whitespace-only lines
//!    and `\r\n` endings).
//! 2. Greedily accumulate paragraphs, joined by `\n\n`, while the buffer
//!    stays within `max_chars`.
//! 3. When the next paragraph would overflow, flush the buffer and start a
//!    new chunk with that paragraph.
//! 4. A single paragraph longer than `max_chars` is hard-split at the
//!    nearest newline or space boundary.
//!
//! The output is a pure function of the input: re-running it yields the
//! same chunks, and a chunk within budget re-chunks to itself.
//!
//! # Example
//!
//! ```rust
//! use hybrid_query_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 1000);
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! ```

use crate::models::Chunk;

/// Default chunk budget in characters.
pub const DEFAULT_MAX_CHARS: usize = 1000;

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Split text into chunk texts on paragraph boundaries, respecting `max_chars`.
///
/// Blank input yields no chunks. Lengths are measured in bytes of UTF-8,
/// and hard splits always land on a character boundary.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = text.replace("\r\n", "\n");

    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in paragraphs(&normalized) {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + PARAGRAPH_SEPARATOR.len() + trimmed.len()
        };

        if would_be > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut chunks);
            continue;
        }

        if !current.is_empty() {
            current.push_str(PARAGRAPH_SEPARATOR);
        }
        current.push_str(trimmed);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split on blank (empty or whitespace-only) lines.
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            if !buf.is_empty() {
                out.push(buf.join("\n"));
                buf.clear();
            }
        } else {
            buf.push(line);
        }
    }
    if !buf.is_empty() {
        out.push(buf.join("\n"));
    }
    out
}

/// Cut an oversized paragraph into pieces of at most `max_chars`.
fn hard_split(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining.to_string());
            break;
        }
        let mut split_at = max_chars;
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        let window = &remaining[..split_at];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&pos| pos > 0)
            .map(|pos| pos + 1)
            .unwrap_or(split_at);
        let cut = if cut == 0 {
            // A single character wider than the budget.
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            cut
        };
        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = remaining[cut..].trim_start();
    }
}

/// Deterministic chunk identifier: `<source>_chunk_<index>`.
pub fn chunk_id(source: &str, index: usize) -> String {
    format!("{}_chunk_{}", source, index)
}

/// Chunk `text` and wrap each span in a [`Chunk`] attributed to `source`.
pub fn make_chunks(source: &str, text: &str, max_chars: usize) -> Vec<Chunk> {
    chunk_text(text, max_chars)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            source: source.to_string(),
            chunk_id: chunk_id(source, i),
            text,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 1000);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_blank_text() {
        assert!(chunk_text("", 1000).is_empty());
        assert!(chunk_text("  \n\n \n", 1000).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text(text, 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], text);
    }

    #[test]
    fn test_paragraphs_exceeding_limit_start_new_chunk() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = chunk_text(text, 30);
        assert_eq!(
            chunks,
            vec![
                "This is paragraph one.".to_string(),
                "This is paragraph two.".to_string(),
                "This is paragraph three.".to_string(),
            ]
        );
    }

    #[test]
    fn test_greedy_packing() {
        // 10 + 2 + 10 = 22 fits in 25; the third paragraph does not.
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc";
        let chunks = chunk_text(text, 25);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "aaaaaaaaaa\n\nbbbbbbbbbb");
        assert_eq!(chunks[1], "cccccccccc");
    }

    #[test]
    fn test_whitespace_only_lines_are_boundaries() {
        let text = "alpha\r\n \r\nbeta";
        let chunks = chunk_text(text, 7);
        assert_eq!(chunks, vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_oversized_paragraph_is_split() {
        let para = "word ".repeat(100);
        let chunks = chunk_text(&para, 42);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.len() <= 42, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        assert_eq!(chunk_text(text, 12), chunk_text(text, 12));
    }

    #[test]
    fn test_rechunking_is_idempotent() {
        let text = (0..40)
            .map(|i| format!("Paragraph number {} talks about something.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let first = chunk_text(&text, 200);
        for chunk in &first {
            assert_eq!(chunk_text(chunk, 200), vec![chunk.clone()]);
        }
        let rejoined = first.join("\n\n");
        assert_eq!(chunk_text(&rejoined, 200), first);
    }

    #[test]
    fn test_make_chunks_ids() {
        let chunks = make_chunks("cv.txt", "one\n\ntwo", 3);
        let ids: Vec<&str> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["cv.txt_chunk_0", "cv.txt_chunk_1"]);
        assert!(chunks.iter().all(|c| c.source == "cv.txt"));
    }

    #[test]
    fn test_multibyte_hard_split() {
        let para = "é".repeat(50);
        let chunks = chunk_text(&para, 9);
        assert!(chunks.iter().all(|c| c.len() <= 9));
        assert_eq!(chunks.concat(), para);
    }
}
