//! In-memory node store: everything currently ingested and searchable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::Chunk;

/// Chunks of one file plus the content hash they were built from.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub content_hash: String,
    pub file_path: PathBuf,
    pub chunks: Vec<Chunk>,
}

/// Filename → chunks, iterated in first-insertion order.
#[derive(Debug, Default)]
pub struct NodeStore {
    docs: HashMap<String, StoredDocument>,
    order: Vec<String>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the chunks of `filename`.
    pub fn insert(&mut self, filename: &str, content_hash: &str, file_path: &Path, chunks: Vec<Chunk>) {
        let doc = StoredDocument {
            content_hash: content_hash.to_string(),
            file_path: file_path.to_path_buf(),
            chunks,
        };
        if self.docs.insert(filename.to_string(), doc).is_none() {
            self.order.push(filename.to_string());
        }
    }

    pub fn get(&self, filename: &str) -> Option<&StoredDocument> {
        self.docs.get(filename)
    }

    pub fn chunks(&self, filename: &str) -> Option<&[Chunk]> {
        self.docs.get(filename).map(|d| d.chunks.as_slice())
    }

    /// Chunks of `filename` only if they were built from `content_hash`.
    pub fn get_fresh(&self, filename: &str, content_hash: &str) -> Option<&[Chunk]> {
        self.docs
            .get(filename)
            .filter(|d| d.content_hash == content_hash)
            .map(|d| d.chunks.as_slice())
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.docs.contains_key(filename)
    }

    pub fn remove(&mut self, filename: &str) -> Option<StoredDocument> {
        let removed = self.docs.remove(filename);
        if removed.is_some() {
            self.order.retain(|f| f != filename);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn filenames(&self) -> &[String] {
        &self.order
    }

    pub fn chunk_count(&self) -> usize {
        self.docs.values().map(|d| d.chunks.len()).sum()
    }

    /// Every chunk, file by file in insertion order.
    pub fn all_chunks(&self) -> Vec<Chunk> {
        self.order
            .iter()
            .filter_map(|f| self.docs.get(f))
            .flat_map(|d| d.chunks.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(file: &str, text: &str) -> Chunk {
        Chunk {
            id: text.to_string(),
            file_name: file.to_string(),
            file_path: format!("/d/{}", file),
            page_label: None,
            chunk_index: 0,
            text: text.to_string(),
            hash: String::new(),
            embedding: None,
        }
    }

    #[test]
    fn replace_keeps_original_position() {
        let mut store = NodeStore::new();
        store.insert("b.txt", "h1", Path::new("/d/b.txt"), vec![chunk("b.txt", "b1")]);
        store.insert("a.txt", "h2", Path::new("/d/a.txt"), vec![chunk("a.txt", "a1")]);
        store.insert("b.txt", "h3", Path::new("/d/b.txt"), vec![chunk("b.txt", "b2"), chunk("b.txt", "b3")]);

        assert_eq!(store.filenames(), &["b.txt".to_string(), "a.txt".to_string()]);
        let texts: Vec<_> = store.all_chunks().into_iter().map(|c| c.text).collect();
        assert_eq!(texts, vec!["b2", "b3", "a1"]);
        assert_eq!(store.chunk_count(), 3);
    }

    #[test]
    fn freshness_follows_hash() {
        let mut store = NodeStore::new();
        store.insert("a.txt", "h1", Path::new("/d/a.txt"), vec![chunk("a.txt", "a1")]);
        assert!(store.get_fresh("a.txt", "h1").is_some());
        assert!(store.get_fresh("a.txt", "h2").is_none());
        assert!(store.get_fresh("b.txt", "h1").is_none());
    }

    #[test]
    fn remove_drops_from_order() {
        let mut store = NodeStore::new();
        store.insert("a.txt", "h", Path::new("/d/a.txt"), vec![]);
        store.insert("b.txt", "h", Path::new("/d/b.txt"), vec![]);
        assert!(store.remove("a.txt").is_some());
        assert!(store.remove("a.txt").is_none());
        assert_eq!(store.filenames(), &["b.txt".to_string()]);
        store.clear();
        assert!(store.is_empty());
    }
}
