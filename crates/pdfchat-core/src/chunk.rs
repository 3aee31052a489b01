//! Fixed-window text chunker and chunk identity assignment.
//!
//! Splits each [`PageDocument`] into overlapping windows of at most
//! `chunk_size` characters, then gives every chunk a deterministic id of
//! the form `"{source_id}:{page_number}:{chunk_index}"`.
//!
//! # Algorithm
//!
//! 1. Walk the page text in windows of `chunk_size` characters, advancing
//!    by `chunk_size - chunk_overlap` each step, so consecutive windows
//!    share `chunk_overlap` characters.
//! 2. Windows that contain only whitespace are dropped.
//! 3. [`assign_chunk_ids`] walks the resulting sequence once. The index
//!    resets to 0 whenever the `(source_id, page_number)` pair differs from
//!    the previous chunk's pair and increments otherwise.
//!
//! Lengths are counted in Unicode scalar values, never bytes, so windows
//! always end on a character boundary.
//!
//! # Example
//!
//! ```rust
//! use pdfchat_core::chunk::Splitter;
//! use pdfchat_core::models::{ExtraMetadata, PageDocument};
//!
//! let splitter = Splitter::new(800, 80).unwrap();
//! let pages = vec![PageDocument::new("a.pdf", 1, "Hello world.")];
//! let chunks = splitter.split_pages(&pages, &ExtraMetadata::new());
//! assert_eq!(chunks[0].chunk_id, "a.pdf:1:0");
//! ```

use crate::error::{Error, Result};
use crate::models::{Chunk, ExtraMetadata, PageDocument};

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 800;
/// Default number of characters shared by consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 80;

/// Overlapping fixed-size character window splitter.
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Splitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Splitter {
    /// Build a splitter. Fails if `chunk_size` is zero or the overlap is
    /// not strictly smaller than the window.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Config(format!(
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

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a single text into overlapping windows.
    pub fn split_text<'a>(&self, text: &'a str) -> Vec<&'a str> {
        // Byte offset of every char start, plus the end of the string.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = bounds.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut windows = Vec::new();
        let mut start = 0;
        while start < char_len {
            let end = (start + self.chunk_size).min(char_len);
            let piece = &text[bounds[start]..bounds[end]];
            if !piece.trim().is_empty() {
                windows.push(piece);
            }
            if end == char_len {
                break;
            }
            start += step;
        }
        windows
    }

    /// Split every page, attach `metadata` to each chunk, and assign ids.
    pub fn split_pages(&self, pages: &[PageDocument], metadata: &ExtraMetadata) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for piece in self.split_text(&page.text) {
                chunks.push(Chunk {
                    source_id: page.source_id.clone(),
                    page_number: page.page_number,
                    chunk_index: 0,
                    chunk_id: String::new(),
                    text: piece.to_string(),
                    metadata: metadata.clone(),
                });
            }
        }
        assign_chunk_ids(&mut chunks);
        chunks
    }
}

/// Assign `chunk_index` and `chunk_id` to an ordered chunk sequence.
///
/// Indices count up within each contiguous run of chunks that share a
/// `(source_id, page_number)` pair. A pair that reappears after a
/// different one starts again at 0.
pub fn assign_chunk_ids(chunks: &mut [Chunk]) {
    let mut last_page: Option<(String, u32)> = None;
    let mut index: u32 = 0;

    for chunk in chunks.iter_mut() {
        let same_page = matches!(
            &last_page,
            Some((source, page)) if *source == chunk.source_id && *page == chunk.page_number
        );
        if same_page {
            index += 1;
        } else {
            index = 0;
            last_page = Some((chunk.source_id.clone(), chunk.page_number));
        }
        chunk.chunk_index = index;
        chunk.chunk_id = format!("{}:{}:{}", chunk.source_id, chunk.page_number, index);
    }
}
