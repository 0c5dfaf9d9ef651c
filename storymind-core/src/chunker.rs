//! Windowing policy for long-form documents.
//!
//! Splits document text into overlapping windows suitable for embedding and
//! retrieval. Unlike the teacher's markdown-hierarchy-aware chunker, novels
//! have no header structure worth preserving, so this is a recursive
//! character splitter with priority separators (paragraph break, line break,
//! sentence-terminal punctuation, space), targeting ~1000 characters with a
//! ~200 character overlap so that mentions near window boundaries remain
//! retrievable from both sides.

use unicode_segmentation::UnicodeSegmentation;

use crate::config::{DEFAULT_WINDOW_CHARS, DEFAULT_WINDOW_OVERLAP};

/// A single overlapping slice of document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Zero-based index of this window within the document.
    pub index: usize,
    /// Byte offset of the window's start within the source text.
    pub start_offset: usize,
    /// Byte offset of the window's end (exclusive) within the source text.
    pub end_offset: usize,
    /// The window's text content.
    pub text: String,
}

/// Split `content` into overlapping windows of ~`target_chars` characters
/// with ~`overlap_chars` characters shared between neighbors.
///
/// Never returns an empty window: a non-empty `content` always yields at
/// least one window, and an empty `content` yields a single empty window
/// (the orchestrator rejects empty documents earlier, in `document::load`,
/// so this only matters for callers exercising the chunker directly).
pub fn window_document(content: &str) -> Vec<Window> {
    window_document_with_sizes(content, DEFAULT_WINDOW_CHARS, DEFAULT_WINDOW_OVERLAP)
}

pub fn window_document_with_sizes(
    content: &str,
    target_chars: usize,
    overlap_chars: usize,
) -> Vec<Window> {
    if content.is_empty() {
        return vec![Window {
            index: 0,
            start_offset: 0,
            end_offset: 0,
            text: String::new(),
        }];
    }

    let segments = split_recursive(content, target_chars);
    let mut windows = Vec::with_capacity(segments.len());
    let mut cursor = 0usize;

    for (idx, segment) in segments.iter().enumerate() {
        let start = content[cursor..]
            .find(segment.as_str())
            .map(|rel| cursor + rel)
            .unwrap_or(cursor);
        let end = start + segment.len();

        let overlapped_start = if idx == 0 {
            start
        } else {
            start.saturating_sub(overlap_chars)
        };
        let text: String =
            content[char_floor(content, overlapped_start)..char_ceil(content, end)].to_string();

        windows.push(Window {
            index: idx,
            start_offset: overlapped_start,
            end_offset: end,
            text,
        });
        cursor = end;
    }

    if windows.is_empty() {
        windows.push(Window {
            index: 0,
            start_offset: 0,
            end_offset: content.len(),
            text: content.to_string(),
        });
    }

    windows
}

/// Snap a byte offset down to the nearest UTF-8 character boundary.
fn char_floor(s: &str, mut offset: usize) -> usize {
    offset = offset.min(s.len());
    while offset > 0 && !s.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Snap a byte offset up to the nearest UTF-8 character boundary.
fn char_ceil(s: &str, mut offset: usize) -> usize {
    offset = offset.min(s.len());
    while offset < s.len() && !s.is_char_boundary(offset) {
        offset += 1;
    }
    offset
}

/// Recursively split `text` on the highest-priority separator that produces
/// pieces under `target_chars`, falling back to coarser splitting only when
/// a piece is still too large.
///
/// Priority order: paragraph break ("\n\n") > line break ("\n") > sentence
/// boundary > space. A piece that is already short enough is returned as-is.
fn split_recursive(text: &str, target_chars: usize) -> Vec<String> {
    let separators: [Separator; 4] = [
        Separator::Paragraph,
        Separator::Line,
        Separator::Sentence,
        Separator::Space,
    ];
    let mut pieces = vec![text.to_string()];

    for separator in separators {
        if pieces.iter().all(|p| p.chars().count() <= target_chars) {
            break;
        }
        pieces = pieces
            .into_iter()
            .flat_map(|piece| {
                if piece.chars().count() <= target_chars {
                    vec![piece]
                } else {
                    split_on(&piece, separator, target_chars)
                }
            })
            .collect();
    }

    merge_small_pieces(pieces, target_chars)
}

#[derive(Clone, Copy)]
enum Separator {
    Paragraph,
    Line,
    Sentence,
    Space,
}

fn split_on(text: &str, separator: Separator, target_chars: usize) -> Vec<String> {
    let raw_pieces: Vec<&str> = match separator {
        Separator::Paragraph => text.split("\n\n").collect(),
        Separator::Line => text.split('\n').collect(),
        Separator::Sentence => text.unicode_sentences().collect(),
        Separator::Space => text.split(' ').collect(),
    };

    // Greedily recombine adjacent pieces up to target_chars so we don't
    // produce one window per sentence/line when several fit together.
    let mut merged = Vec::new();
    let mut current = String::new();
    let joiner = match separator {
        Separator::Paragraph => "\n\n",
        Separator::Line => "\n",
        Separator::Sentence => "",
        Separator::Space => " ",
    };

    for piece in raw_pieces {
        if piece.is_empty() {
            continue;
        }
        let candidate_len = current.chars().count()
            + if current.is_empty() {
                0
            } else {
                joiner.chars().count()
            }
            + piece.chars().count();
        if !current.is_empty() && candidate_len > target_chars {
            merged.push(current);
            current = String::new();
        }
        if !current.is_empty() {
            current.push_str(joiner);
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        merged.push(current);
    }
    if merged.is_empty() {
        merged.push(text.to_string());
    }
    merged
}

/// Merge consecutive pieces under ~half the target size into their neighbor
/// so the splitter doesn't emit a stream of tiny trailing windows.
fn merge_small_pieces(pieces: Vec<String>, target_chars: usize) -> Vec<String> {
    if pieces.len() <= 1 {
        return pieces;
    }
    let min_chars = target_chars / 2;
    let mut merged: Vec<String> = Vec::new();
    for piece in pieces {
        if let Some(last) = merged.last_mut() {
            if last.chars().count() < min_chars
                && last.chars().count() + piece.chars().count() <= target_chars * 2
            {
                last.push_str(&piece);
                continue;
            }
        }
        merged.push(piece);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_one_empty_window() {
        let windows = window_document("");
        assert_eq!(windows.len(), 1);
        assert!(windows[0].text.is_empty());
    }

    #[test]
    fn short_document_yields_single_window() {
        let windows = window_document("Harry Potter lived at number four, Privet Drive.");
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].index, 0);
    }

    #[test]
    fn windows_are_never_empty() {
        let text = "Paragraph one.\n\nParagraph two.\n\nParagraph three.".repeat(100);
        let windows = window_document(&text);
        assert!(windows.iter().all(|w| !w.text.is_empty()));
    }

    #[test]
    fn windows_are_ordered_and_indexed() {
        let text = "Sentence one. Sentence two. ".repeat(200);
        let windows = window_document(&text);
        for (i, w) in windows.iter().enumerate() {
            assert_eq!(w.index, i);
        }
    }

    #[test]
    fn long_document_produces_multiple_windows_with_overlap() {
        let paragraph =
            "Hermione Granger raised her hand before the professor finished asking. ".repeat(3);
        let text = std::iter::repeat(paragraph)
            .take(40)
            .collect::<Vec<_>>()
            .join("\n\n");
        let windows = window_document(&text);
        assert!(
            windows.len() > 1,
            "expected multiple windows for a long document"
        );
        for pair in windows.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(b.start_offset <= a.end_offset);
        }
    }

    #[test]
    fn target_chars_roughly_respected() {
        let text = "word ".repeat(5000);
        let windows = window_document_with_sizes(&text, 1000, 200);
        for w in &windows {
            assert!(
                w.text.chars().count() <= 2200,
                "window too large: {}",
                w.text.len()
            );
        }
    }
}
