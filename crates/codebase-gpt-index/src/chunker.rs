//! Fixed-size character windows with overlap.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::extractor::SourceFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkerConfig {
    /// # Errors
    ///
    /// Returns [`IndexError::Config`] if the size is zero or the overlap is not smaller than it.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(IndexError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IndexError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_size.saturating_sub(self.chunk_overlap).max(1)
    }
}

/// One window of a source file, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: String,
    /// 0-based position within `source`.
    pub index: usize,
    pub text: String,
}

/// Lazy iterator over the windows of one text. Yields nothing for empty input.
#[derive(Debug)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()`.
    bounds: Vec<usize>,
    start: usize,
    size: usize,
    step: usize,
    done: bool,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let chars = self.bounds.len() - 1;
        if self.done || chars == 0 {
            return None;
        }
        let end = (self.start + self.size).min(chars);
        let window = &self.text[self.bounds[self.start]..self.bounds[end]];
        if end == chars {
            self.done = true;
        } else {
            self.start += self.step;
        }
        Some(window)
    }
}

/// Split `text` into windows of `chunk_size` chars, each starting
/// `chunk_size - chunk_overlap` chars after the previous one. The last window ends at the
/// end of the text and may be shorter.
#[must_use]
pub fn chunk<'a>(text: &'a str, config: &ChunkerConfig) -> Chunks<'a> {
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    Chunks {
        text,
        bounds,
        start: 0,
        size: config.chunk_size.max(1),
        step: config.step(),
        done: false,
    }
}

/// Chunk a whole file, tagging each window with its source name and index.
pub fn chunk_file(file: &SourceFile, config: ChunkerConfig) -> impl Iterator<Item = Chunk> + '_ {
    chunk(&file.content, &config)
        .enumerate()
        .map(|(index, text)| Chunk {
            source: file.name.clone(),
            index,
            text: text.to_owned(),
        })
}

/// Number of windows [`chunk`] yields for a text of `chars` characters.
#[must_use]
pub fn expected_chunk_count(chars: usize, config: &ChunkerConfig) -> usize {
    let size = config.chunk_size.max(1);
    if chars == 0 {
        0
    } else if chars <= size {
        1
    } else {
        1 + (chars - size).div_ceil(config.step())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn cfg(chunk_size: usize, chunk_overlap: usize) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    fn reconstruct(chunks: &[&str], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert_eq!(chunk("", &cfg(10, 2)).count(), 0);
        assert_eq!(expected_chunk_count(0, &cfg(10, 2)), 0);
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks: Vec<_> = chunk("hello", &cfg(10, 2)).collect();
        assert_eq!(chunks, vec!["hello"]);
    }

    #[test]
    fn exact_size_single_chunk() {
        let chunks: Vec<_> = chunk("abcde", &cfg(5, 2)).collect();
        assert_eq!(chunks, vec!["abcde"]);
    }

    #[test]
    fn windows_overlap_and_stop_at_end() {
        let chunks: Vec<_> = chunk("abcdefghij", &cfg(5, 2)).collect();
        assert_eq!(chunks, vec!["abcde", "defgh", "ghij"]);
        assert_eq!(expected_chunk_count(10, &cfg(5, 2)), 3);
    }

    #[test]
    fn zero_overlap_partitions() {
        let chunks: Vec<_> = chunk("abcdefg", &cfg(3, 0)).collect();
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[test]
    fn multibyte_chars_are_not_split() {
        let text = "héllo wörld ✓✓✓";
        let chunks: Vec<_> = chunk(text, &cfg(4, 1)).collect();
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert_eq!(reconstruct(&chunks, 1), text);
    }

    #[test]
    fn chunk_file_tags_source_and_index() {
        let file = SourceFile {
            name: "src/widget.rs".into(),
            content: "abcdefghij".into(),
        };
        let chunks: Vec<_> = chunk_file(&file, cfg(5, 2)).collect();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.source == "src/widget.rs"));
        assert_eq!(
            chunks.iter().map(|c| c.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn validate_rejects_bad_config() {
        assert!(cfg(0, 0).validate().is_err());
        assert!(cfg(10, 10).validate().is_err());
        assert!(cfg(10, 11).validate().is_err());
        assert!(cfg(10, 9).validate().is_ok());
        assert!(ChunkerConfig::default().validate().is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn reconstructs_original(text in "\\PC{0,400}", size in 1usize..60, overlap_frac in 0usize..100) {
            let overlap = (size - 1) * overlap_frac / 100;
            let config = cfg(size, overlap);
            let chunks: Vec<_> = chunk(&text, &config).collect();
            prop_assert_eq!(reconstruct(&chunks, overlap), text);
        }

        #[test]
        fn count_matches_formula(text in "\\PC{0,400}", size in 1usize..60, overlap_frac in 0usize..100) {
            let overlap = (size - 1) * overlap_frac / 100;
            let config = cfg(size, overlap);
            let n = chunk(&text, &config).count();
            prop_assert_eq!(n, expected_chunk_count(text.chars().count(), &config));
        }

        #[test]
        fn no_empty_chunks_and_full_windows(text in "\\PC{0,400}", size in 1usize..60, overlap_frac in 0usize..100) {
            let overlap = (size - 1) * overlap_frac / 100;
            let chunks: Vec<_> = chunk(&text, &cfg(size, overlap)).collect();
            for (i, c) in chunks.iter().enumerate() {
                prop_assert!(!c.is_empty());
                let len = c.chars().count();
                if i + 1 < chunks.len() {
                    prop_assert_eq!(len, size);
                } else {
                    prop_assert!(len <= size);
                }
            }
        }

        #[test]
        fn deterministic(text in "\\PC{0,200}", size in 1usize..40) {
            let config = cfg(size, size / 3);
            let a: Vec<_> = chunk(&text, &config).collect();
            let b: Vec<_> = chunk(&text, &config).collect();
            prop_assert_eq!(a, b);
        }
    }
}
