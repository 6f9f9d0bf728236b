use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{Chunk, IngestionOptions, Metadata};
use serde_json::Value;
use tracing::warn;

/// Separators tried in order: paragraph, line, word, character.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            chunk_overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap > self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk overlap {} is larger than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits `text` into windows of at most `chunk_size` characters, preferring
/// paragraph, then line, then word boundaries. Consecutive windows share up
/// to `chunk_overlap` characters of whole pieces.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_recursive(text, &DEFAULT_SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut separator = separators.last().copied().unwrap_or("");
    let mut remaining: &[&str] = &[];

    for (position, &candidate) in separators.iter().enumerate() {
        if candidate.is_empty() {
            separator = candidate;
            break;
        }
        if text.contains(candidate) {
            separator = candidate;
            remaining = &separators[position + 1..];
            break;
        }
    }

    let mut chunks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.chunk_size {
            pending.push(piece);
            continue;
        }

        if !pending.is_empty() {
            chunks.extend(merge_pieces(&pending, config));
            pending.clear();
        }

        if remaining.is_empty() {
            chunks.push(piece.to_string());
        } else {
            chunks.extend(split_recursive(piece, remaining, config));
        }
    }

    if !pending.is_empty() {
        chunks.extend(merge_pieces(&pending, config));
    }

    chunks
}

/// Splits on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (position, _) in text.match_indices(separator) {
        if position > start {
            pieces.push(&text[start..position]);
        }
        start = position;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces.into_iter().filter(|piece| !piece.is_empty()).collect()
}

fn merge_pieces(pieces: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut merged = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for &piece in pieces {
        let length = char_len(piece);

        if total + length > config.chunk_size {
            if total > config.chunk_size {
                warn!(
                    size = total,
                    limit = config.chunk_size,
                    "created a chunk longer than the configured size"
                );
            }

            if !window.is_empty() {
                if let Some(joined) = join_window(&window) {
                    merged.push(joined);
                }

                while total > config.chunk_overlap
                    || (total + length > config.chunk_size && total > 0)
                {
                    let dropped = window.remove(0);
                    total -= char_len(dropped);
                }
            }
        }

        window.push(piece);
        total += length;
    }

    if let Some(joined) = join_window(&window) {
        merged.push(joined);
    }

    merged
}

fn join_window(window: &[&str]) -> Option<String> {
    let joined = window.concat();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Chunks every page of one file. Ordinals run across pages so that ids are
/// `<stem>-<ordinal>` and stable between uploads of the same document.
pub fn build_chunks(
    stem: &str,
    pages: &[PageText],
    base_metadata: &Metadata,
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut ordinal = 0u64;

    for page in pages {
        for text in split_text(&page.text, config) {
            let chunk_index = ordinal;
            ordinal += 1;

            if text.trim().is_empty() {
                continue;
            }

            let mut metadata = base_metadata.clone();
            metadata.insert(
                "page".to_string(),
                Value::from(page.number.saturating_sub(1)),
            );
            metadata.insert("chunk_index".to_string(), Value::from(chunk_index));

            chunks.push(Chunk {
                id: make_chunk_id(stem, chunk_index),
                text,
                metadata,
            });
        }
    }

    Ok(chunks)
}

pub fn make_chunk_id(stem: &str, ordinal: u64) -> String {
    format!("{stem}-{ordinal}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("  Pump maintenance schedule.  ", config(500, 100));
        assert_eq!(chunks, vec!["Pump maintenance schedule.".to_string()]);
    }

    #[test]
    fn paragraphs_are_kept_together_when_they_fit() {
        let text = "First paragraph.\n\nSecond paragraph.";
        let chunks = split_text(text, config(500, 100));
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn paragraphs_split_when_window_is_full() {
        let text = "aaaa bbbb\n\ncccc dddd\n\neeee ffff";
        let chunks = split_text(text, config(12, 0));
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd", "eeee ffff"]);
    }

    #[test]
    fn words_overlap_between_windows() {
        let text = "one two three four five six";
        let chunks = split_text(text, config(10, 5));
        assert_eq!(chunks, vec!["one two", "two three", "four five", "five six"]);
    }

    #[test]
    fn long_words_fall_back_to_characters() {
        let chunks = split_text("abcdefghij", config(4, 0));
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn chunks_never_exceed_window_for_regular_prose() {
        let sentence = "The hydraulic pump must be inspected every 500 operating hours. ";
        let text = sentence.repeat(40);
        for chunk in split_text(&text, config(500, 100)) {
            assert!(chunk.chars().count() <= 500);
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "überprüfung ".repeat(60);
        let chunks = split_text(&text, config(50, 10));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 50));
    }

    #[test]
    fn overlap_larger_than_size_is_rejected() {
        assert!(config(100, 200).validate().is_err());
        assert!(config(0, 0).validate().is_err());
        assert!(config(500, 100).validate().is_ok());
    }

    #[test]
    fn chunk_ids_follow_stem_and_ordinal_across_pages() -> Result<(), IngestError> {
        let pages = vec![
            PageText {
                number: 1,
                text: "aaaa bbbb\n\ncccc dddd".to_string(),
            },
            PageText {
                number: 2,
                text: "eeee ffff".to_string(),
            },
        ];
        let mut base = Metadata::new();
        base.insert("source".to_string(), Value::from("manual.pdf"));

        let chunks = build_chunks("manual", &pages, &base, config(12, 0))?;

        let ids: Vec<_> = chunks.iter().map(|chunk| chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["manual-0", "manual-1", "manual-2"]);
        assert_eq!(chunks[2].metadata["page"], 1);
        assert_eq!(chunks[2].metadata["chunk_index"], 2);
        assert_eq!(chunks[0].metadata["source"], "manual.pdf");
        Ok(())
    }

    #[test]
    fn whitespace_pages_produce_no_chunks() -> Result<(), IngestError> {
        let pages = vec![PageText {
            number: 1,
            text: " \n\n \n ".to_string(),
        }];
        let chunks = build_chunks("blank", &pages, &Metadata::new(), config(500, 100))?;
        assert!(chunks.is_empty());
        Ok(())
    }
}
