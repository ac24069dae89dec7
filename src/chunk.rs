//! Line-addressable source chunker.
//!
//! Splits file text into bounded, overlapping chunks while tracking exact
//! 1-based source line ranges, so every retrieval hit can be cited as
//! `path:start-end`. Splitting prefers logical boundaries — a blank line or
//! the start of a definition — and falls back to a fixed character budget
//! when none is in range.
//!
//! Chunking is deterministic: the same text and parameters always produce
//! the same spans, and chunk ids are content-derived, so re-indexing an
//! unchanged file reproduces identical ids while any edit mints new ones.

use sha2::{Digest, Sha256};

/// A bounded slice of a source file with its exact line range.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    /// First source line included, 1-based.
    pub start_line: u32,
    /// Last source line included, 1-based, inclusive.
    pub end_line: u32,
    pub text: String,
}

/// Line prefixes treated as definition starts when choosing break points.
const DEFINITION_PREFIXES: &[&str] = &[
    "fn ", "pub ", "async fn ", "impl ", "struct ", "enum ", "trait ", "mod ", "def ",
    "class ", "function ", "func ", "public ", "private ", "protected ",
];

/// Split text into chunks of at most `max_chars`, with `overlap_chars` of
/// trailing text shared between consecutive chunks.
///
/// Whitespace-only input yields no chunks. A single line longer than
/// `max_chars` becomes its own oversized chunk — lines are never split, so
/// line ranges stay exact.
pub fn chunk_lines(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<ChunkSpan> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = text.lines().collect();
    let mut spans = Vec::new();
    let mut start = 0usize;

    while start < lines.len() {
        while start < lines.len() && lines[start].trim().is_empty() {
            start += 1;
        }
        if start >= lines.len() {
            break;
        }

        // Greedily extend until the next line would exceed the budget.
        let mut end = start;
        let mut size = lines[start].len();
        while end + 1 < lines.len() {
            let next_len = lines[end + 1].len() + 1;
            if size + next_len > max_chars {
                break;
            }
            size += next_len;
            end += 1;
        }

        // Budget-limited (not end of input): back up to a logical boundary
        // if one exists in the second half of the window.
        if end + 1 < lines.len() {
            if let Some(cut) = preferred_break(&lines, start, end) {
                end = cut;
            }
        }

        spans.push(ChunkSpan {
            start_line: (start + 1) as u32,
            end_line: (end + 1) as u32,
            text: lines[start..=end].join("\n"),
        });

        if end + 1 >= lines.len() {
            break;
        }

        // Next chunk starts far enough back to share `overlap_chars` of
        // trailing text, but always makes forward progress.
        let mut next = end + 1;
        if overlap_chars > 0 {
            let mut acc = 0usize;
            let mut i = end;
            while i > start {
                acc += lines[i].len() + 1;
                if acc >= overlap_chars {
                    break;
                }
                i -= 1;
            }
            next = i.max(start + 1);
        }
        start = next;
    }

    spans
}

/// Latest line `j` in the second half of `start..=end` such that the line
/// after `j` is blank or begins a definition.
fn preferred_break(lines: &[&str], start: usize, end: usize) -> Option<usize> {
    let floor = start + (end - start) / 2;
    for j in (floor..end).rev() {
        let following = lines[j + 1].trim_start();
        if lines[j + 1].trim().is_empty() || is_definition_line(following) {
            return Some(j);
        }
    }
    None
}

fn is_definition_line(trimmed: &str) -> bool {
    DEFINITION_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Content-derived chunk id: SHA-256 over path, line range, and text.
///
/// An unchanged file reproduces the same ids on re-chunking; any edit to a
/// chunk's text or position mints a new id, superseding the old one.
pub fn chunk_id(path: &str, span: &ChunkSpan) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0u8]);
    hasher.update(span.start_line.to_le_bytes());
    hasher.update(span.end_line.to_le_bytes());
    hasher.update(span.text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_lines("", 100, 20).is_empty());
        assert!(chunk_lines("  \n\n  ", 100, 20).is_empty());
    }

    #[test]
    fn small_text_single_chunk_with_lines() {
        let spans = chunk_lines("fn main() {\n    run();\n}", 1000, 200);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_line, 1);
        assert_eq!(spans[0].end_line, 3);
        assert_eq!(spans[0].text, "fn main() {\n    run();\n}");
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = (0..80)
            .map(|i| format!("let value_{} = {};", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let a = chunk_lines(&text, 200, 40);
        let b = chunk_lines(&text, 200, 40);
        assert_eq!(a, b);
        assert!(a.len() > 1);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = (0..40)
            .map(|i| format!("line number {:02}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let spans = chunk_lines(&text, 150, 30);
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            // Next chunk starts at or before the previous chunk's end.
            assert!(pair[1].start_line <= pair[0].end_line + 1);
            assert!(pair[1].start_line > pair[0].start_line);
        }
    }

    #[test]
    fn line_ranges_match_source() {
        let text = (0..40)
            .map(|i| format!("line number {:02}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let source_lines: Vec<&str> = text.lines().collect();
        for span in chunk_lines(&text, 150, 0) {
            let expected = source_lines
                [(span.start_line as usize - 1)..=(span.end_line as usize - 1)]
                .join("\n");
            assert_eq!(span.text, expected);
        }
    }

    #[test]
    fn prefers_blank_line_boundaries() {
        // Two paragraphs that don't fit in one chunk; the break should land
        // on the blank line between them, not mid-paragraph.
        let para_a = (0..6).map(|i| format!("alpha {}", i)).collect::<Vec<_>>();
        let para_b = (0..6).map(|i| format!("beta {}", i)).collect::<Vec<_>>();
        let text = format!("{}\n\n{}", para_a.join("\n"), para_b.join("\n"));

        let spans = chunk_lines(&text, 60, 0);
        assert!(spans.len() >= 2);
        assert!(!spans[0].text.contains("beta"));
    }

    #[test]
    fn oversized_line_is_its_own_chunk() {
        let long = "x".repeat(500);
        let text = format!("short\n{}\nshort again", long);
        let spans = chunk_lines(&text, 100, 0);
        let oversized = spans.iter().find(|s| s.text.len() >= 500).unwrap();
        assert_eq!(oversized.start_line, oversized.end_line);
        assert_eq!(oversized.start_line, 2);
    }

    #[test]
    fn ids_are_stable_and_content_sensitive() {
        let span = ChunkSpan {
            start_line: 10,
            end_line: 20,
            text: "fn check() {}".into(),
        };
        let id1 = chunk_id("src/auth.rs", &span);
        let id2 = chunk_id("src/auth.rs", &span);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 32);

        let mut edited = span.clone();
        edited.text = "fn check() { fixed() }".into();
        assert_ne!(id1, chunk_id("src/auth.rs", &edited));
        assert_ne!(id1, chunk_id("src/other.rs", &span));
    }
}
