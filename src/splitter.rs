use serde::{Deserialize, Serialize};

use crate::pdf::PageDocument;
use crate::text::normalize;

/// A contiguous span of normalized text carved from one page of one source.
///
/// `id` is assigned after splitting (see `ingest::assign_chunk_ids`) and is
/// empty until then.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub page: usize,
}

/// Splits page text into bounded chunks by character count.
///
/// A separator-priority list is tried in order: text is cut at the first
/// separator that actually occurs, segments are merged greedily up to
/// `chunk_size`, and oversized segments recurse into the next separator.
/// Text with no usable separator falls back to a plain sliding window.
/// `chunk_overlap` characters are carried between consecutive chunks.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self::with_separators(
            chunk_size,
            chunk_overlap,
            ["\n\n", "\n", ". ", " "].iter().map(|s| s.to_string()).collect(),
        )
    }

    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: Vec<String>,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators,
        }
    }

    /// Splits every page into chunks, normalizing chunk content.
    ///
    /// Chunks whose normalized content is empty are dropped. Order follows
    /// the input page order, so downstream ID assignment is deterministic.
    pub fn split_pages(&self, pages: &[PageDocument]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for piece in self.split_text(&page.text) {
                let content = normalize(&piece);
                if content.is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    id: String::new(),
                    content,
                    source: page.source.clone(),
                    page: page.page,
                });
            }
        }
        chunks
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        self.split_recursive(trimmed, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        let Some((separator, remaining)) = separators.split_first() else {
            return self.split_by_size(text);
        };

        let segments = split_keeping_separator(text, separator);
        if segments.len() <= 1 {
            // Separator absent at this level, try the next one
            return self.split_recursive(text, remaining);
        }

        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for segment in segments {
            if current.is_empty() {
                current.push_str(segment);
            } else if char_len(&current) + char_len(segment) <= self.chunk_size {
                current.push_str(segment);
            } else {
                let overlap_tail = tail_chars(&current, self.chunk_overlap).to_string();
                self.flush(current, remaining, &mut chunks);
                current = overlap_tail;
                current.push_str(segment);
            }
        }

        if !current.is_empty() {
            self.flush(current, remaining, &mut chunks);
        }

        chunks
    }

    fn flush(&self, pending: String, remaining: &[String], chunks: &mut Vec<String>) {
        if char_len(&pending) > self.chunk_size {
            chunks.extend(self.split_recursive(&pending, remaining));
        } else {
            chunks.push(pending);
        }
    }

    /// Sliding-window split on character boundaries, used when no separator
    /// applies. Never cuts inside a UTF-8 sequence.
    fn split_by_size(&self, text: &str) -> Vec<String> {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total_chars = boundaries.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < total_chars {
            let end = (start + self.chunk_size).min(total_chars);
            chunks.push(text[boundaries[start]..boundaries[end]].to_string());
            if end == total_chars {
                break;
            }
            start += step;
        }
        chunks
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Last `n` characters of `s`, on a valid boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

/// Splits at `separator`, keeping the separator attached to the preceding
/// segment so no text is lost.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> PageDocument {
        PageDocument {
            source: "law.pdf".to_string(),
            page: 0,
            text: text.to_string(),
        }
    }

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(100, 20);
        let chunks = splitter.split_text("one short paragraph");
        assert_eq!(chunks, vec!["one short paragraph".to_string()]);
    }

    #[test]
    fn respects_max_chunk_size() {
        let splitter = TextSplitter::new(50, 10);
        let text = "word ".repeat(200);
        for chunk in splitter.split_text(&text) {
            assert!(chunk.chars().count() <= 50, "oversized chunk: {chunk:?}");
        }
    }

    #[test]
    fn paragraph_separator_takes_priority() {
        let splitter = TextSplitter::new(40, 0);
        let text = "first paragraph here\n\nsecond paragraph here";
        let chunks = splitter.split_text(text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("first paragraph"));
        assert!(chunks[1].starts_with("second paragraph"));
    }

    #[test]
    fn overlap_carried_between_window_chunks() {
        let splitter = TextSplitter::new(20, 5);
        let text: String = ('a'..='z').cycle().take(100).collect();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(5).collect::<Vec<_>>()
                .into_iter().rev().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn multibyte_text_never_panics() {
        let splitter = TextSplitter::new(10, 3);
        let text = "áéíóú".repeat(40);
        let chunks = splitter.split_text(&text);
        assert!(!chunks.is_empty());
        for chunk in chunks {
            assert!(chunk.chars().count() <= 10);
        }
    }

    #[test]
    fn split_pages_normalizes_and_keeps_page_metadata() {
        let splitter = TextSplitter::new(1000, 0);
        let pages = vec![page("Artículo 1.- El Estado garantiza..."), PageDocument {
            source: "law.pdf".to_string(),
            page: 1,
            text: "TÍTULO II".to_string(),
        }];
        let chunks = splitter.split_pages(&pages);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "articulo 1 el estado garantiza");
        assert_eq!(chunks[0].page, 0);
        assert_eq!(chunks[1].content, "titulo ii");
        assert_eq!(chunks[1].page, 1);
        assert!(chunks.iter().all(|c| c.id.is_empty()));
    }

    #[test]
    fn blank_pages_produce_no_chunks() {
        let splitter = TextSplitter::new(100, 10);
        let chunks = splitter.split_pages(&[page("   \n\n  ")]);
        assert!(chunks.is_empty());
    }
}
