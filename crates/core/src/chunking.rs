use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::PageChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows of the same page.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 80,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Splits `text` into overlapping windows of at most `chunk_size` characters.
/// The last window always ends at the end of the text; no trailing window
/// wholly contained in its predecessor is emitted.
pub fn split_text(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        pieces.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }

        start = end - config.chunk_overlap;
    }

    Ok(pieces)
}

/// Chunks every page in order. Output is page order, then left to right
/// within a page; chunk identifiers depend on this ordering staying stable.
pub fn split_pages(pages: &[PageText], config: ChunkingConfig) -> Result<Vec<PageChunk>, IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    for page in pages {
        if page.text.is_empty() {
            continue;
        }

        chunks.extend(split_text(&page.text, config)?.into_iter().map(|text| PageChunk {
            source_path: page.source_path.clone(),
            page_number: page.number,
            text,
        }));
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            source_path: "data/rules.pdf".to_string(),
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn windows_overlap_by_configured_amount() {
        let config = ChunkingConfig {
            chunk_size: 4,
            chunk_overlap: 1,
        };
        assert_eq!(split_text("abcdefghij", config).unwrap(), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let pieces = split_text("Each player starts with $1500.", ChunkingConfig::default()).unwrap();
        assert_eq!(pieces, vec!["Each player starts with $1500."]);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let config = ChunkingConfig {
            chunk_size: 3,
            chunk_overlap: 0,
        };
        assert_eq!(split_text("ééééé", config).unwrap(), vec!["ééé", "éé"]);
    }

    #[test]
    fn final_window_ends_at_text_end_without_redundant_tail() {
        let config = ChunkingConfig {
            chunk_size: 4,
            chunk_overlap: 2,
        };
        assert_eq!(split_text("abcdef", config).unwrap(), vec!["abcd", "cdef"]);
    }

    #[test]
    fn zero_chunk_size_is_rejected_before_splitting() {
        let config = ChunkingConfig {
            chunk_size: 0,
            chunk_overlap: 0,
        };
        assert!(matches!(
            split_text("Each player starts with $1500.", config),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }

    #[test]
    fn empty_pages_produce_no_chunks() {
        let chunks = split_pages(&[page(1, ""), page(2, "Go")], ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_number, 2);
    }

    #[test]
    fn chunks_keep_page_then_position_order() {
        let config = ChunkingConfig {
            chunk_size: 5,
            chunk_overlap: 0,
        };
        let chunks = split_pages(&[page(1, "aaaaabbbbb"), page(2, "ccccc")], config).unwrap();

        let texts: Vec<_> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaaa", "bbbbb", "ccccc"]);
        assert_eq!(chunks[1].page_number, 1);
        assert_eq!(chunks[2].page_number, 2);
        assert!(chunks.iter().all(|chunk| chunk.source_path == "data/rules.pdf"));
    }

    #[test]
    fn invalid_overlap_is_rejected() {
        let config = ChunkingConfig {
            chunk_size: 10,
            chunk_overlap: 10,
        };
        assert!(matches!(
            split_pages(&[page(1, "text")], config),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }
}
