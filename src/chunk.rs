//! Sentence-aware text splitter.
//!
//! Text is split recursively until every piece fits the chunk budget:
//! first on the paragraph separator, then on sentence boundaries, then with
//! the secondary chunking regex (clauses), then on spaces, and finally into
//! single characters. Pieces are then greedily merged back into chunks of
//! at most `chunk_size` tokens, each new chunk starting with up to
//! `chunk_overlap` tokens taken from the tail of the previous one.
//!
//! Token counts are estimated at [`CHARS_PER_TOKEN`] characters per token.
//! Splitting is a pure function of its inputs, so re-extracting an
//! unchanged file always reproduces the same chunks and chunk ids.

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::config::IngestionConfig;
use crate::models::Chunk;

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

pub struct SentenceSplitter {
    max_chars: usize,
    overlap_chars: usize,
    paragraph_separator: String,
    secondary: Regex,
}

/// A piece of text produced by the recursive split, with its length in chars.
struct Split<'a> {
    text: &'a str,
    len: usize,
}

impl SentenceSplitter {
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        paragraph_separator: &str,
        chunking_regex: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            max_chars: chunk_size.max(1) * CHARS_PER_TOKEN,
            overlap_chars: chunk_overlap * CHARS_PER_TOKEN,
            paragraph_separator: paragraph_separator.to_string(),
            secondary: Regex::new(chunking_regex)?,
        })
    }

    pub fn from_config(config: &IngestionConfig) -> Result<Self, regex::Error> {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            &config.paragraph_separator,
            &config.chunking_regex,
        )
    }

    /// Split `text` into trimmed, non-empty chunk texts.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let mut splits = Vec::new();
        self.split(text, &mut splits);
        self.merge(&splits)
    }

    /// Split one page (or one whole non-paged document) into [`Chunk`]s with
    /// contiguous indices starting at 0.
    pub fn split_document(
        &self,
        file_name: &str,
        file_path: &str,
        page_label: Option<&str>,
        text: &str,
    ) -> Vec<Chunk> {
        self.split_text(text)
            .into_iter()
            .enumerate()
            .map(|(i, chunk_text)| make_chunk(file_name, file_path, page_label, i as u32, chunk_text))
            .collect()
    }

    fn split<'a>(&self, text: &'a str, out: &mut Vec<Split<'a>>) {
        let len = text.chars().count();
        if len <= self.max_chars {
            out.push(Split { text, len });
            return;
        }

        for piece in self.split_by_fns(text) {
            let len = piece.chars().count();
            if len <= self.max_chars {
                out.push(Split { text: piece, len });
            } else {
                self.split(piece, out);
            }
        }
    }

    /// Pieces from the first splitting strategy that breaks `text` apart.
    fn split_by_fns<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let pieces = split_keep_separator(text, &self.paragraph_separator);
        if pieces.len() > 1 {
            return pieces;
        }
        let pieces = split_sentences(text);
        if pieces.len() > 1 {
            return pieces;
        }
        let pieces: Vec<&str> = self.secondary.find_iter(text).map(|m| m.as_str()).collect();
        if pieces.len() > 1 {
            return pieces;
        }
        let pieces = split_keep_separator(text, " ");
        if pieces.len() > 1 {
            return pieces;
        }
        split_chars(text)
    }

    fn merge(&self, splits: &[Split<'_>]) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut current_len = 0usize;
        let mut new_chunk = true;
        let mut i = 0;

        while i < splits.len() {
            let split = &splits[i];
            if current_len + split.len > self.max_chars && !new_chunk {
                chunks.push(concat(&current));
                let last = std::mem::take(&mut current);
                current_len = 0;
                new_chunk = true;

                // seed the next chunk with the tail of the last one
                let mut overlap = Vec::new();
                for &(text, len) in last.iter().rev() {
                    if current_len + len > self.overlap_chars {
                        break;
                    }
                    current_len += len;
                    overlap.push((text, len));
                }
                overlap.reverse();
                current = overlap;
            } else {
                current_len += split.len;
                current.push((split.text, split.len));
                new_chunk = false;
                i += 1;
            }
        }
        if !new_chunk {
            chunks.push(concat(&current));
        }

        chunks
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

fn concat(pieces: &[(&str, usize)]) -> String {
    pieces.iter().map(|(t, _)| *t).collect()
}

/// Split on `sep`, keeping the separator at the start of every piece after
/// the first. Empty pieces are dropped.
fn split_keep_separator<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    if sep.is_empty() {
        return vec![text];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(sep) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Sentence boundaries: terminal punctuation followed by whitespace. The
/// whitespace stays attached to the preceding sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?' | '。' | '？' | '！') {
            continue;
        }
        let mut end = i + c.len_utf8();
        let mut saw_space = false;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            saw_space = true;
            end = j + w.len_utf8();
            chars.next();
        }
        if saw_space && end < text.len() {
            pieces.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn split_chars(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}

fn make_chunk(
    file_name: &str,
    file_path: &str,
    page_label: Option<&str>,
    index: u32,
    text: String,
) -> Chunk {
    let hash = hex::encode(Sha256::digest(text.as_bytes()));

    let mut hasher = Sha256::new();
    hasher.update(file_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(page_label.unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let id = hex::encode(&hasher.finalize()[..16]);

    Chunk {
        id,
        file_name: file_name.to_string(),
        file_path: file_path.to_string(),
        page_label: page_label.map(str::to_string),
        chunk_index: index,
        text,
        hash,
        embedding: None,
    }
}
