//! Recursive character text chunker.
//!
//! Splits each page record into [`Chunk`]s of at most `chunk_size`
//! characters. Text is cut at the coarsest boundary that works, trying
//! paragraph breaks (`\n\n`), then line breaks, then spaces, then single
//! characters. Neighbouring pieces are merged back up to `chunk_size`, and
//! consecutive chunks carry up to `chunk_overlap` characters of shared
//! context.
//!
//! Sizes are counted in `char`s, never bytes, so multi-byte text is never
//! cut inside a code point. Every chunk copies `source` and `page` from
//! its parent record.

use crate::error::RagError;
use crate::models::{Chunk, TextRecord};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits page records into overlapping, bounded chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk every record, preserving record order.
    pub fn split_records(&self, records: &[TextRecord]) -> Vec<Chunk> {
        records
            .iter()
            .flat_map(|record| {
                self.split_text(&record.text)
                    .into_iter()
                    .map(move |text| Chunk {
                        text,
                        source: record.source.clone(),
                        page: record.page,
                    })
            })
            .collect()
    }

    /// Split raw text into trimmed, non-empty pieces of at most `chunk_size` chars.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Pick the first separator present in the text; "" always matches.
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(i, sep)| (i, *sep))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let finer = if separator.is_empty() {
            &[][..]
        } else {
            &separators[idx + 1..]
        };

        let mut out = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                out.extend(self.merge(&pending));
                pending.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }
        if !pending.is_empty() {
            out.extend(self.merge(&pending));
        }

        out
    }

    /// Greedily join pieces up to `chunk_size`, then slide a window that
    /// keeps at most `chunk_overlap` chars of tail as the next chunk's head.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_trimmed(&mut out, &window);
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_trimmed(&mut out, &window);

        out
    }
}

fn push_trimmed(out: &mut Vec<String>, window: &std::collections::VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split at `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, source: &str, page: u32) -> TextRecord {
        TextRecord {
            text: text.to_string(),
            source: source.to_string(),
            page,
        }
    }

    #[test]
    fn short_record_yields_one_chunk() {
        let chunker = Chunker::new(3000, 300).unwrap();
        let chunks = chunker.split_records(&[record("Hello, world!", "a.pdf", 1)]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn metadata_survives_splitting() {
        let chunker = Chunker::new(10, 2).unwrap();
        let chunks = chunker.split_records(&[record(
            "This is a test document for RAG verification.",
            "test.pdf",
            1,
        )]);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert_eq!(c.source, "test.pdf");
            assert_eq!(c.page, 1);
            assert!(c.text.chars().count() <= 10, "too long: {:?}", c.text);
            assert!(!c.text.trim().is_empty());
        }
    }

    #[test]
    fn hello_world_splits_on_space() {
        let chunker = Chunker::new(10, 2).unwrap();
        assert_eq!(chunker.split_text("Hello world"), vec!["Hello", "world"]);
    }

    #[test]
    fn chunks_never_span_records() {
        let chunker = Chunker::new(20, 5).unwrap();
        let records = vec![
            record("alpha beta gamma delta epsilon", "a.pdf", 1),
            record("zeta eta theta iota kappa", "a.pdf", 2),
            record("lambda mu", "b.pdf", 1),
        ];
        let chunks = chunker.split_records(&records);
        let pages: Vec<(String, u32)> = chunks.iter().map(|c| (c.source.clone(), c.page)).collect();
        let mut sorted = pages.clone();
        sorted.sort();
        assert_eq!(pages, sorted, "record order must be preserved");
        assert!(chunks
            .iter()
            .filter(|c| c.page == 2)
            .all(|c| !c.text.contains("alpha")));
        assert_eq!(chunks.last().unwrap().text, "lambda mu");
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let chunker = Chunker::new(12, 6).unwrap();
        let chunks = chunker.split_text("one two three four five six");
        assert!(chunks.len() > 1);
        // Each chunk after the first starts with a word that ended the previous one.
        for pair in chunks.windows(2) {
            let first_word = pair[1].split(' ').next().unwrap();
            assert!(
                pair[0].contains(first_word),
                "{:?} should share context with {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let chunker = Chunker::new(30, 0).unwrap();
        let chunks = chunker.split_text("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(
            chunks,
            vec!["First paragraph here.", "Second paragraph here."]
        );
    }

    #[test]
    fn long_words_fall_back_to_characters() {
        let chunker = Chunker::new(4, 1).unwrap();
        let chunks = chunker.split_text("abcdefghij");
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert!(chunks[0].starts_with('a'));
    }

    #[test]
    fn multibyte_text_is_not_cut_mid_char() {
        let chunker = Chunker::new(5, 1).unwrap();
        let chunks = chunker.split_text("überall größer ñandú café");
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn deterministic() {
        let chunker = Chunker::new(15, 4).unwrap();
        let records = vec![record("Alpha\n\nBeta gamma delta\nepsilon zeta eta", "x.pdf", 3)];
        assert_eq!(chunker.split_records(&records), chunker.split_records(&records));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 10).is_err());
    }
}
