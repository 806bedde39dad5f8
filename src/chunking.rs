//! Chunking utilities for splitting ingested documents into overlapping segments.
//!
//! Two strategies are provided: fixed character windows ([`chunk_text`] /
//! [`chunk_source`]) for plain extracted text, and a structure-aware fold
//! ([`chunk_by_structure`]) for ingestion pipelines that preserve headings
//! and page provenance.
//!
//! Chunks are identified by a content hash, and duplicate content within an
//! ingestion batch is dropped (first occurrence wins).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A bounded span of source text, the atomic unit of retrieval.
///
/// Chunks are immutable once stored: `chunk_id` is the SHA-256 hex digest of
/// the whitespace-normalized text, so identical content always maps to the
/// same id regardless of which document produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Originating document (file name or logical source id).
    pub source_id: String,
    /// Inclusive page span within the source, if known.
    pub page_range: Option<(u32, u32)>,
    /// Content hash of the normalized chunk text.
    pub chunk_id: String,
    /// Position of this chunk within its ingestion batch.
    pub sequence_no: usize,
    /// The chunk text content.
    pub text: String,
}

impl Chunk {
    /// Build a chunk from raw text, computing its content hash.
    pub fn new(
        source_id: &str,
        page_range: Option<(u32, u32)>,
        sequence_no: usize,
        text: String,
    ) -> Self {
        let chunk_id = content_hash(&text);
        Self {
            source_id: source_id.to_string(),
            page_range,
            chunk_id,
            sequence_no,
            text,
        }
    }

    /// Short hex prefix of the chunk id for display in citations.
    pub fn short_id(&self) -> &str {
        let len = self.chunk_id.len().min(12);
        &self.chunk_id[..len]
    }
}

/// SHA-256 hex digest of the whitespace-normalized text.
///
/// Runs of whitespace collapse to single spaces and the ends are trimmed, so
/// re-extracted text with different line wrapping still deduplicates.
///
/// # Examples
///
/// ```
/// use attrieve::chunking::content_hash;
///
/// assert_eq!(content_hash("a  b\nc"), content_hash("a b c"));
/// assert_ne!(content_hash("a b c"), content_hash("a b d"));
/// ```
pub fn content_hash(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Split text into fixed windows of `size` characters advancing by
/// `size - overlap`.
///
/// Windows cover the whole input: each spans `[start, min(start+size, len))`
/// in characters (UTF-8 safe), and the loop ends once a window reaches the
/// end of the text. Requires `overlap < size`, otherwise the window would
/// never advance; violating the precondition returns
/// [`Error::ChunkConfig`] rather than looping.
///
/// # Examples
///
/// ```
/// use attrieve::chunking::chunk_text;
///
/// let chunks = chunk_text("abcdefghij", 4, 1).unwrap();
/// assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
///
/// assert!(chunk_text("abc", 2, 2).is_err());
/// ```
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    if size == 0 || overlap >= size {
        return Err(Error::ChunkConfig { size, overlap });
    }

    // Map char index -> byte index so windows never split a code point.
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = char_to_byte.len() - 1;

    if char_count == 0 {
        return Ok(Vec::new());
    }

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(char_count);
        chunks.push(text[char_to_byte[start]..char_to_byte[end]].to_string());
        if end == char_count {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Chunk one extracted source into [`Chunk`]s with batch-level deduplication.
///
/// The ingestion pipeline hands over `(source_id, page_range, text)` triples;
/// this windows the text and drops windows whose content hash was already
/// seen, preserving first-seen order.
pub fn chunk_source(
    source_id: &str,
    page_range: Option<(u32, u32)>,
    text: &str,
    size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    let windows = chunk_text(text, size, overlap)?;
    let chunks = windows
        .into_iter()
        .enumerate()
        .map(|(i, w)| Chunk::new(source_id, page_range, i, w))
        .collect();
    Ok(dedup_chunks(chunks))
}

/// A structural element produced by a document converter: a run of text with
/// its page number and whether it is a section heading.
#[derive(Debug, Clone)]
pub struct StructuredElement {
    pub text: String,
    pub page: u32,
    pub heading: bool,
}

/// Fold structural elements into chunks, respecting headings and page spans.
///
/// Elements accumulate into the current chunk until a heading starts or the
/// soft budget (`soft_max_chars`) would be exceeded; either condition begins
/// a new chunk. A folded chunk longer than `max_chars` falls back to fixed
/// windows with `overlap`. Each chunk's `page_range` is the min/max page over
/// the elements folded into it. Duplicate content is dropped as in
/// [`chunk_source`].
pub fn chunk_by_structure(
    source_id: &str,
    elements: &[StructuredElement],
    max_chars: usize,
    soft_max_chars: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    if max_chars == 0 || overlap >= max_chars {
        return Err(Error::ChunkConfig {
            size: max_chars,
            overlap,
        });
    }

    let mut folds: Vec<(String, u32, u32)> = Vec::new();
    let mut text = String::new();
    let mut pages: Option<(u32, u32)> = None;

    for element in elements {
        let trimmed = element.text.trim();
        if trimmed.is_empty() {
            continue;
        }

        let breaks_here = !text.is_empty()
            && (element.heading || text.len() + trimmed.len() + 1 > soft_max_chars);
        if breaks_here {
            let (lo, hi) = pages.unwrap_or((element.page, element.page));
            folds.push((std::mem::take(&mut text), lo, hi));
            pages = None;
        }

        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(trimmed);
        pages = Some(match pages {
            Some((lo, hi)) => (lo.min(element.page), hi.max(element.page)),
            None => (element.page, element.page),
        });
    }
    if !text.is_empty() {
        let (lo, hi) = pages.unwrap_or((0, 0));
        folds.push((text, lo, hi));
    }

    let mut chunks = Vec::new();
    for (folded, lo, hi) in folds {
        if folded.chars().count() <= max_chars {
            let seq = chunks.len();
            chunks.push(Chunk::new(source_id, Some((lo, hi)), seq, folded));
        } else {
            for window in chunk_text(&folded, max_chars, overlap)? {
                let seq = chunks.len();
                chunks.push(Chunk::new(source_id, Some((lo, hi)), seq, window));
            }
        }
    }

    Ok(dedup_chunks(chunks))
}

/// Drop chunks whose content hash was already seen, preserving first-seen
/// order, and renumber `sequence_no` over the survivors.
pub fn dedup_chunks(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| seen.insert(c.chunk_id.clone()))
        .enumerate()
        .map(|(i, mut c)| {
            c.sequence_no = i;
            c
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
            .unwrap();
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn empty_text_no_chunks() {
        let chunks = chunk_text("", 10, 2).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn windows_cover_full_text_without_gaps() {
        let text: String = ('a'..='z').cycle().take(95).collect();
        let size = 30;
        let overlap = 10;
        let chunks = chunk_text(&text, size, overlap).unwrap();

        // Reassembling with the overlap stripped must reproduce the input.
        let mut rebuilt = chunks[0].clone();
        for c in &chunks[1..] {
            let c_chars: Vec<char> = c.chars().collect();
            rebuilt.extend(c_chars[overlap.min(c_chars.len())..].iter());
        }
        assert_eq!(rebuilt, text);

        for c in &chunks {
            assert!(c.chars().count() <= size);
        }
    }

    #[test]
    fn overlap_equal_to_size_fails_fast() {
        let err = chunk_text("some text", 5, 5).unwrap_err();
        assert!(matches!(err, Error::ChunkConfig { size: 5, overlap: 5 }));
    }

    #[test]
    fn overlap_larger_than_size_fails_fast() {
        assert!(chunk_text("some text", 5, 9).is_err());
        assert!(chunk_text("some text", 0, 0).is_err());
    }

    #[test]
    fn final_window_reaches_text_end() {
        let text = "0123456789";
        let chunks = chunk_text(text, 4, 2).unwrap();
        assert!(chunks.last().unwrap().ends_with('9'));
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld 日本語テキスト ".repeat(20);
        let chunks = chunk_text(&text, 16, 4).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 16);
        }
    }

    #[test]
    fn content_hash_normalizes_whitespace() {
        assert_eq!(content_hash("rated  load\n100kg"), content_hash("rated load 100kg"));
    }

    #[test]
    fn chunk_source_dedups_repeated_windows() {
        // Identical halves produce identical windows with size == half length.
        let text = "abcdefgh".repeat(2);
        let chunks = chunk_source("spec.pdf", Some((1, 2)), &text, 8, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "abcdefgh");
        assert_eq!(chunks[0].sequence_no, 0);
        assert_eq!(chunks[0].source_id, "spec.pdf");
        assert_eq!(chunks[0].page_range, Some((1, 2)));
    }

    #[test]
    fn chunk_source_sequences_are_ordered() {
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_source("a.txt", None, text, 12, 3).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_no, i);
        }
    }

    fn elem(text: &str, page: u32, heading: bool) -> StructuredElement {
        StructuredElement {
            text: text.to_string(),
            page,
            heading,
        }
    }

    #[test]
    fn structure_fold_merges_until_soft_budget() {
        let elements = vec![
            elem("first paragraph", 1, false),
            elem("second paragraph", 1, false),
            elem("third paragraph on the next page", 2, false),
        ];
        let chunks = chunk_by_structure("doc.pdf", &elements, 500, 500, 50).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_range, Some((1, 2)));
        assert!(chunks[0].text.contains("first paragraph"));
        assert!(chunks[0].text.contains("third paragraph"));
    }

    #[test]
    fn structure_fold_breaks_on_heading() {
        let elements = vec![
            elem("Intro body", 1, false),
            elem("Specifications", 2, true),
            elem("Rated load 1000 kg", 2, false),
        ];
        let chunks = chunk_by_structure("doc.pdf", &elements, 500, 500, 50).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_range, Some((1, 1)));
        assert_eq!(chunks[1].page_range, Some((2, 2)));
        assert!(chunks[1].text.starts_with("Specifications"));
    }

    #[test]
    fn structure_fold_splits_oversized_elements() {
        let elements = vec![elem(&"x".repeat(250), 3, false)];
        let chunks = chunk_by_structure("doc.pdf", &elements, 100, 100, 10).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
            assert_eq!(c.page_range, Some((3, 3)));
        }
    }

    #[test]
    fn structure_fold_rejects_bad_overlap() {
        let elements = vec![elem("text", 1, false)];
        assert!(chunk_by_structure("doc.pdf", &elements, 10, 10, 10).is_err());
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let chunks = vec![
            Chunk::new("a.pdf", None, 0, "alpha".to_string()),
            Chunk::new("b.pdf", None, 1, "alpha".to_string()),
            Chunk::new("a.pdf", None, 2, "beta".to_string()),
        ];
        let deduped = dedup_chunks(chunks);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source_id, "a.pdf");
        assert_eq!(deduped[0].sequence_no, 0);
        assert_eq!(deduped[1].text, "beta");
        assert_eq!(deduped[1].sequence_no, 1);
    }
}
