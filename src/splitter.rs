//! Recursive character splitting for page text.
//!
//! Text is cut on the first separator from a priority list that occurs in it,
//! oversized pieces are split again with the remaining separators, and the
//! resulting pieces are merged greedily back into chunks of at most
//! `chunk_size` characters that overlap by up to `chunk_overlap` characters.

use std::collections::VecDeque;

use tracing::warn;

use crate::error::{RagError, Result};

/// Separator priority used when no custom list is supplied.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Chunk sizing knobs, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingConfig {
    /// Validates and builds a chunking config.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidInput(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidInput(format!(
                "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Maximum characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters carried over from one chunk into the next.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Splits text on a prioritized separator list.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Builds a splitter using [`DEFAULT_SEPARATORS`].
    pub fn new(config: ChunkingConfig) -> Self {
        Self::with_separators(config, &DEFAULT_SEPARATORS)
    }

    /// Builds a splitter with a custom separator priority. An empty separator
    /// means "split into characters" and ends the search.
    pub fn with_separators(config: ChunkingConfig, separators: &[&str]) -> Self {
        Self {
            config,
            separators: separators.iter().map(|sep| sep.to_string()).collect(),
        }
    }

    /// Returns the active sizing config.
    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Splits `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > size {
                if total > size {
                    warn!(total, size, "created a chunk longer than the configured size");
                }
                if !window.is_empty() {
                    if let Some(doc) = join_window(&window) {
                        docs.push(doc);
                    }
                    while total > overlap || (total + len > size && total > 0) {
                        match window.pop_front() {
                            Some(front) => total -= char_len(front),
                            None => break,
                        }
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        if let Some(doc) = join_window(&window) {
            docs.push(doc);
        }
        docs
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (idx, sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return ("", &[]);
        }
        if text.contains(sep.as_str()) {
            return (sep.as_str(), &separators[idx + 1..]);
        }
    }
    (separators.last().map(String::as_str).unwrap_or(""), &[])
}

/// Cuts `text` before every occurrence of `separator`, so each separator
/// stays attached to the start of the piece that follows it.
fn split_keeping_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(idx, ch)| &text[idx..idx + ch.len_utf8()])
            .collect();
    }
    let mut bounds = vec![0];
    bounds.extend(text.match_indices(separator).map(|(idx, _)| idx));
    bounds.push(text.len());
    bounds
        .windows(2)
        .map(|pair| &text[pair[0]..pair[1]])
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn join_window(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(ChunkingConfig::new(size, overlap).expect("config"))
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(matches!(
            ChunkingConfig::new(100, 100),
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            ChunkingConfig::new(0, 0),
            Err(RagError::InvalidInput(_))
        ));
        assert!(ChunkingConfig::new(100, 99).is_ok());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(splitter(1000, 200).split_text("Hello world"), vec!["Hello world"]);
    }

    #[test]
    fn blank_text_yields_nothing() {
        assert!(splitter(1000, 200).split_text("  \n\n  ").is_empty());
        assert!(splitter(1000, 200).split_text("").is_empty());
    }

    #[test]
    fn three_thousand_chars_make_four_overlapping_chunks() {
        let text = "abcdefghi ".repeat(300);
        assert_eq!(char_len(&text), 3000);
        let chunks = splitter(1000, 200).split_text(&text);
        let lens: Vec<usize> = chunks.iter().map(|chunk| char_len(chunk)).collect();
        assert_eq!(lens, vec![999, 999, 999, 599]);
        let tail: String = chunks[0].chars().skip(999 - 199).collect();
        assert!(chunks[1].starts_with(&tail));
    }

    #[test]
    fn words_overlap_between_neighbours() {
        let chunks = splitter(12, 5).split_text("alpha beta gamma delta");
        assert_eq!(chunks, vec!["alpha beta", "beta gamma", "delta"]);
    }

    #[test]
    fn paragraphs_are_preferred_split_points() {
        let text = "First paragraph here.\n\nSecond paragraph is a bit longer.\n\nThird.";
        assert_eq!(
            splitter(40, 0).split_text(text),
            vec![
                "First paragraph here.",
                "Second paragraph is a bit longer.",
                "Third."
            ]
        );
    }

    #[test]
    fn falls_back_to_characters() {
        assert_eq!(
            splitter(4, 1).split_text("abcdefghij"),
            vec!["abcd", "defg", "ghij"]
        );
    }

    #[test]
    fn chunk_length_counts_characters_not_bytes() {
        let text = "é".repeat(10);
        let chunks = splitter(4, 0).split_text(&text);
        assert!(chunks.iter().all(|chunk| char_len(chunk) <= 4));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn separator_stays_with_following_piece() {
        assert_eq!(
            split_keeping_separator("a\n\nb\n\nc", "\n\n"),
            vec!["a", "\n\nb", "\n\nc"]
        );
        assert_eq!(split_keeping_separator("\n\nx", "\n\n"), vec!["\n\nx"]);
    }
}
