//! Recursive character chunking.
//!
//! Text is split on the coarsest separator it contains (paragraph break, line break, sentence
//! end, word boundary) and the resulting segments are packed greedily into chunks of at most
//! `chunk_size` characters. Segments that are still too large are split again with the next,
//! finer separator; the empty separator splits between characters as a last resort. Separators
//! stay attached to the segment they end, so the chunks tile the input exactly.
//!
//! A second pass prepends to every chunk after the first the last `overlap` characters of the
//! chunk before it. Lengths are counted in `char`s, never bytes.

use super::types::{Chunk, ChunkingError, RawPage};

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Split `text` into ordered, overlapping chunks.
///
/// Empty input yields no chunks; input no longer than `chunk_size` yields a single chunk
/// equal to the input.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    validate(chunk_size, overlap)?;
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let base = split_recursive(text, chunk_size, &SEPARATORS);
    Ok(apply_overlap(&base, overlap))
}

/// Chunk every page with extractable text, numbering chunks continuously across the document.
///
/// Pages whose text is blank are skipped.
pub fn chunk_pages(
    pages: &[RawPage],
    document_id: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, ChunkingError> {
    validate(chunk_size, overlap)?;
    let mut chunks = Vec::new();

    for page in pages.iter().filter(|page| !page.text.trim().is_empty()) {
        for text in split_text(&page.text, chunk_size, overlap)? {
            chunks.push(Chunk {
                text,
                page_number: page.page_number,
                chunk_index: chunks.len(),
                source_document_id: document_id.to_string(),
            });
        }
    }

    Ok(chunks)
}

fn validate(chunk_size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

fn split_recursive<'a>(text: &'a str, chunk_size: usize, separators: &[&str]) -> Vec<&'a str> {
    if char_len(text) <= chunk_size {
        return vec![text];
    }

    let (separator, finer) = match separators
        .iter()
        .position(|separator| separator.is_empty() || text.contains(separator))
    {
        Some(position) => (separators[position], &separators[position + 1..]),
        None => ("", &[][..]),
    };

    let mut chunks = Vec::new();
    // Current buffer is `text[start..end]`, `buffered` chars long.
    let mut start = 0;
    let mut end = 0;
    let mut buffered = 0;

    for segment in segments(text, separator) {
        let segment_len = char_len(segment);

        if segment_len > chunk_size {
            if end > start {
                chunks.push(&text[start..end]);
            }
            let mut pieces = split_recursive(segment, chunk_size, finer);
            end += segment.len();
            // The tail piece keeps accumulating with the following segments.
            match pieces.pop() {
                Some(last) => {
                    start = end - last.len();
                    buffered = char_len(last);
                }
                None => {
                    start = end;
                    buffered = 0;
                }
            }
            chunks.extend(pieces);
            continue;
        }

        if buffered + segment_len > chunk_size && end > start {
            chunks.push(&text[start..end]);
            start = end;
            buffered = 0;
        }
        end += segment.len();
        buffered += segment_len;
    }

    if end > start {
        chunks.push(&text[start..end]);
    }
    chunks
}

fn segments<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        text.char_indices()
            .map(|(offset, ch)| &text[offset..offset + ch.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(separator).collect()
    }
}

fn apply_overlap(chunks: &[&str], overlap: usize) -> Vec<String> {
    let mut overlapped = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        if index == 0 || overlap == 0 {
            overlapped.push((*chunk).to_string());
            continue;
        }
        let tail = char_suffix(chunks[index - 1], overlap);
        let mut combined = String::with_capacity(tail.len() + chunk.len());
        combined.push_str(tail);
        combined.push_str(chunk);
        overlapped.push(combined);
    }
    overlapped
}

fn char_suffix(text: &str, count: usize) -> &str {
    let total = char_len(text);
    if total <= count {
        return text;
    }
    let offset = text
        .char_indices()
        .nth(total - count)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    &text[offset..]
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strip the carried overlap from each chunk, recovering the pre-overlap chunks.
    fn strip_overlap(chunks: &[String], overlap: usize) -> Vec<String> {
        let mut base: Vec<String> = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            if index == 0 {
                base.push(chunk.clone());
                continue;
            }
            let shared = overlap.min(char_len(&base[index - 1]));
            base.push(chunk.chars().skip(shared).collect());
        }
        base
    }

    fn sample_texts() -> Vec<String> {
        vec![
            "abcdefghi ".repeat(240),
            "First paragraph with a few sentences. Another one here.\n\nSecond paragraph.\nA line.\n\n\nThird."
                .repeat(15),
            "x".repeat(3001),
            "naïve café résumé — ünïcödé text spans. ".repeat(40),
            "short".to_string(),
            "aa bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb cc\n".repeat(9),
        ]
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_text("", 1000, 200).unwrap().is_empty());
    }

    #[test]
    fn short_input_yields_single_chunk_without_overlap() {
        let text = "A document that fits in one chunk.";
        assert_eq!(split_text(text, 1000, 200).unwrap(), vec![text.to_string()]);
        let exact = "y".repeat(1000);
        assert_eq!(split_text(&exact, 1000, 200).unwrap(), vec![exact.clone()]);
    }

    #[test]
    fn splits_2400_characters_into_three_chunks() {
        let text = "abcdefghi ".repeat(240);
        assert_eq!(text.len(), 2400);

        let chunks = split_text(&text, 1000, 200).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(|chunk| char_len(chunk)).collect();
        assert_eq!(lengths, vec![1000, 1200, 600]);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = "first paragraph.\n\nsecond paragraph.";
        let chunks = split_text(text, 20, 0).unwrap();
        assert_eq!(chunks, vec!["first paragraph.\n\n", "second paragraph."]);
    }

    #[test]
    fn hard_splits_text_without_separators() {
        let chunks = split_text("abcdefghij", 4, 2).unwrap();
        assert_eq!(chunks, vec!["abcd", "cdefgh", "ghij"]);
    }

    #[test]
    fn oversized_word_is_resplit_and_tail_keeps_accumulating() {
        let chunks = split_text("aa bbbbbbbb cc", 4, 0).unwrap();
        assert_eq!(chunks, vec!["aa ", "bbbb", "bbbb", " cc"]);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunks = split_text("ééééé", 2, 1).unwrap();
        assert_eq!(chunks, vec!["éé", "ééé", "éé"]);
    }

    #[test]
    fn non_overlapping_portions_reconstruct_input() {
        for text in sample_texts() {
            for (chunk_size, overlap) in [(1000, 200), (50, 10), (7, 6), (1, 0), (64, 0)] {
                let chunks = split_text(&text, chunk_size, overlap).unwrap();
                let rebuilt: String = strip_overlap(&chunks, overlap).concat();
                assert_eq!(rebuilt, text, "size={chunk_size} overlap={overlap}");
            }
        }
    }

    #[test]
    fn base_chunks_respect_chunk_size() {
        for text in sample_texts() {
            for (chunk_size, overlap) in [(1000, 200), (50, 10), (7, 6)] {
                let chunks = split_text(&text, chunk_size, overlap).unwrap();
                for base in strip_overlap(&chunks, overlap) {
                    assert!(!base.is_empty());
                    assert!(char_len(&base) <= chunk_size);
                }
            }
        }
    }

    #[test]
    fn adjacent_chunks_share_bounded_overlap() {
        for text in sample_texts() {
            let overlap = 10;
            let chunks = split_text(&text, 50, overlap).unwrap();
            let base = strip_overlap(&chunks, overlap);
            for index in 1..chunks.len() {
                let shared = overlap.min(char_len(&base[index - 1]));
                let expected = char_suffix(&base[index - 1], shared);
                assert!(chunks[index].starts_with(expected));
                assert_eq!(char_len(&chunks[index]), shared + char_len(&base[index]));
            }
        }
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = sample_texts().remove(1);
        assert_eq!(
            split_text(&text, 40, 8).unwrap(),
            split_text(&text, 40, 8).unwrap()
        );
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert_eq!(
            split_text("abc", 0, 0).unwrap_err(),
            ChunkingError::InvalidChunkSize
        );
        assert_eq!(
            split_text("abc", 10, 10).unwrap_err(),
            ChunkingError::InvalidOverlap {
                chunk_size: 10,
                overlap: 10
            }
        );
    }

    #[test]
    fn chunk_pages_numbers_chunks_across_pages() {
        let page = |number: u32, text: &str| RawPage {
            text: text.to_string(),
            page_number: number,
            source_key: "docs/d1.pdf".into(),
            total_pages: 3,
        };
        let pages = vec![
            page(1, "abcdefghij"),
            page(2, "   \n "),
            page(3, "klmnop"),
        ];

        let chunks = chunk_pages(&pages, "d1", 4, 0).unwrap();
        let indices: Vec<usize> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
        let page_numbers: Vec<u32> = chunks.iter().map(|chunk| chunk.page_number).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(page_numbers, vec![1, 1, 1, 3, 3]);
        assert!(chunks.iter().all(|chunk| chunk.source_document_id == "d1"));
    }
}
