//! Persistent content-hash cache of chunk lists.
//!
//! Layout under the cache directory:
//!
//! ```text
//! <cache_dir>/
//!   index.json            filename -> {hash, chunk_count, cached_at, artifact}
//!   chunks/<name>.json    one versioned artifact per source filename
//!   .lock                 advisory lock taken while mutating
//! ```
//!
//! An entry is valid only while its stored hash equals the SHA-256 of the
//! file currently on disk. Every read failure (missing file, bad JSON,
//! version or hash mismatch) is logged and treated as a miss. Writes go to a
//! temp file that is renamed into place, so readers see either the old or
//! the new artifact, never half of one.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::Chunk;

/// Bumped whenever the artifact or index layout changes. Older or newer
/// artifacts are rejected as corrupt, which forces reprocessing.
pub const FORMAT_VERSION: u32 = 1;

const INDEX_FILE: &str = "index.json";
const LOCK_FILE: &str = ".lock";
const ARTIFACT_DIR: &str = "chunks";
const HASH_BLOCK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache corruption: {0}")]
    Corruption(String),
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Validity of a cache entry against the file currently on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Missing,
    Valid,
    /// The file changed since it was cached.
    Stale,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Missing => write!(f, "missing"),
            CacheStatus::Valid => write!(f, "valid"),
            CacheStatus::Stale => write!(f, "stale"),
        }
    }
}

/// Index row for one cached file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub hash: String,
    pub chunk_count: usize,
    pub cached_at: DateTime<Utc>,
    /// Artifact file name relative to `<cache_dir>/chunks`.
    pub artifact: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    format_version: u32,
    file_name: String,
    file_hash: String,
    chunks: Vec<StoredChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredChunk {
    id: String,
    page_label: Option<String>,
    chunk_index: u32,
    text: String,
    hash: String,
    /// Base64 of little-endian `f32` bytes.
    embedding: Option<String>,
}

impl StoredChunk {
    fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            page_label: chunk.page_label.clone(),
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
            hash: chunk.hash.clone(),
            embedding: chunk.embedding.as_ref().map(|v| STANDARD.encode(vec_to_blob(v))),
        }
    }

    fn into_chunk(self, file_name: &str, file_path: &str) -> Result<Chunk, CacheError> {
        let embedding = match self.embedding {
            Some(encoded) => {
                let bytes = STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| CacheError::Corruption(format!("bad embedding encoding: {}", e)))?;
                if bytes.len() % 4 != 0 {
                    return Err(CacheError::Corruption(
                        "embedding byte length is not a multiple of 4".to_string(),
                    ));
                }
                Some(blob_to_vec(&bytes))
            }
            None => None,
        };
        Ok(Chunk {
            id: self.id,
            file_name: file_name.to_string(),
            file_path: file_path.to_string(),
            page_label: self.page_label,
            chunk_index: self.chunk_index,
            text: self.text,
            hash: self.hash,
            embedding,
        })
    }
}

/// Streaming SHA-256 of a file's raw bytes, hex encoded.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Artifact file name for a display filename. Path separators and other
/// characters unsafe in file names become `_`.
pub fn artifact_name(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let safe = if safe.starts_with('.') {
        format!("_{}", &safe[1..])
    } else {
        safe
    };
    format!("{}.json", safe)
}

/// Exclusive advisory lock on `<cache_dir>/.lock`, released on drop.
struct DirLock(File);

impl DirLock {
    fn acquire(dir: &Path) -> io::Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(Self(file))
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

/// Write `bytes` to `path` via a sibling temp file and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

pub struct ContentCache {
    dir: PathBuf,
    index: BTreeMap<String, CacheEntry>,
}

impl ContentCache {
    /// Open (creating if needed) the cache directory and load its index.
    /// A corrupt index is logged and replaced by an empty one.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(dir.join(ARTIFACT_DIR))?;
        let index = match read_index(dir) {
            Ok(index) => index,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "ignoring unreadable cache index");
                BTreeMap::new()
            }
        };
        debug!(dir = %dir.display(), entries = index.len(), "opened content cache");
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry(&self, filename: &str) -> Option<&CacheEntry> {
        self.index.get(filename)
    }

    /// All index rows, ordered by filename.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.index.iter()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Cached chunks for `filename` if the entry matches the current bytes
    /// of `file_path`; `None` otherwise.
    pub fn get(&self, filename: &str, file_path: &Path) -> Option<Vec<Chunk>> {
        match hash_file(file_path) {
            Ok(hash) => self.lookup(filename, file_path, &hash),
            Err(e) => {
                warn!(file = filename, error = %e, "cannot hash file, treating as cache miss");
                None
            }
        }
    }

    /// Like [`get`](Self::get) with the file hash already computed.
    pub fn lookup(&self, filename: &str, file_path: &Path, current_hash: &str) -> Option<Vec<Chunk>> {
        let entry = self.index.get(filename)?;
        if entry.hash != current_hash {
            info!(file = filename, "file changed since it was cached");
            return None;
        }

        match self.read_artifact(filename, entry, current_hash, file_path) {
            Ok(chunks) => {
                debug!(file = filename, chunks = chunks.len(), "cache hit");
                Some(chunks)
            }
            Err(e) => {
                warn!(file = filename, error = %e, "unreadable cache entry, treating as miss");
                None
            }
        }
    }

    pub fn status(&self, filename: &str, file_path: &Path) -> Result<CacheStatus, CacheError> {
        let Some(entry) = self.index.get(filename) else {
            return Ok(CacheStatus::Missing);
        };
        if entry.hash == hash_file(file_path)? {
            Ok(CacheStatus::Valid)
        } else {
            Ok(CacheStatus::Stale)
        }
    }

    /// Hash `file_path` and store `chunks` for `filename`, replacing any
    /// previous entry.
    pub fn put(&mut self, filename: &str, file_path: &Path, chunks: &[Chunk]) -> Result<CacheEntry, CacheError> {
        let hash = hash_file(file_path)?;
        self.put_with_hash(filename, &hash, chunks)
    }

    pub fn put_with_hash(&mut self, filename: &str, hash: &str, chunks: &[Chunk]) -> Result<CacheEntry, CacheError> {
        let artifact = Artifact {
            format_version: FORMAT_VERSION,
            file_name: filename.to_string(),
            file_hash: hash.to_string(),
            chunks: chunks.iter().map(StoredChunk::from_chunk).collect(),
        };
        let bytes = serde_json::to_vec(&artifact).map_err(io::Error::from)?;
        let entry = CacheEntry {
            hash: hash.to_string(),
            chunk_count: chunks.len(),
            cached_at: Utc::now(),
            artifact: artifact_name(filename),
        };

        let _lock = DirLock::acquire(&self.dir)?;
        let mut on_disk = self.index_under_lock();
        write_atomic(&self.artifact_path(&entry.artifact), &bytes)?;
        on_disk.insert(filename.to_string(), entry.clone());
        write_index(&self.dir, &on_disk)?;
        self.index = on_disk;

        debug!(file = filename, chunks = chunks.len(), "cached chunks");
        Ok(entry)
    }

    /// Drop the entry and artifact for `filename`. Returns whether one existed.
    pub fn remove(&mut self, filename: &str) -> Result<bool, CacheError> {
        let _lock = DirLock::acquire(&self.dir)?;
        let mut on_disk = self.index_under_lock();
        let removed = on_disk.remove(filename);
        if let Some(entry) = &removed {
            remove_if_exists(&self.artifact_path(&entry.artifact))?;
            write_index(&self.dir, &on_disk)?;
        }
        self.index = on_disk;
        Ok(removed.is_some())
    }

    /// Remove every entry and artifact. Returns the number of entries dropped.
    pub fn clear(&mut self) -> Result<usize, CacheError> {
        let _lock = DirLock::acquire(&self.dir)?;
        let on_disk = self.index_under_lock();
        let count = on_disk.len();

        for entry in fs::read_dir(self.dir.join(ARTIFACT_DIR))? {
            let path = entry?.path();
            if path.is_file() {
                remove_if_exists(&path)?;
            }
        }
        write_index(&self.dir, &BTreeMap::new())?;
        self.index.clear();

        info!(dir = %self.dir.display(), entries = count, "cleared content cache");
        Ok(count)
    }

    /// Index as currently on disk, falling back to the in-memory copy when
    /// the file is unreadable. Call with the lock held.
    fn index_under_lock(&self) -> BTreeMap<String, CacheEntry> {
        match read_index(&self.dir) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "cache index unreadable, rewriting from memory");
                self.index.clone()
            }
        }
    }

    fn artifact_path(&self, artifact: &str) -> PathBuf {
        self.dir.join(ARTIFACT_DIR).join(artifact)
    }

    fn read_artifact(
        &self,
        filename: &str,
        entry: &CacheEntry,
        expected_hash: &str,
        file_path: &Path,
    ) -> Result<Vec<Chunk>, CacheError> {
        let bytes = fs::read(self.artifact_path(&entry.artifact))?;
        let artifact: Artifact =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corruption(e.to_string()))?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(CacheError::Corruption(format!(
                "format version {} (expected {})",
                artifact.format_version, FORMAT_VERSION
            )));
        }
        if artifact.file_name != filename {
            return Err(CacheError::Corruption(format!(
                "artifact belongs to {}",
                artifact.file_name
            )));
        }
        if artifact.file_hash != expected_hash {
            return Err(CacheError::Corruption("artifact hash does not match index".to_string()));
        }
        if artifact.chunks.len() != entry.chunk_count {
            return Err(CacheError::Corruption(format!(
                "{} chunks stored, index says {}",
                artifact.chunks.len(),
                entry.chunk_count
            )));
        }

        let path = file_path.to_string_lossy();
        artifact
            .chunks
            .into_iter()
            .map(|c| c.into_chunk(filename, &path))
            .collect()
    }
}

fn read_index(dir: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
    let path = dir.join(INDEX_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    let index: IndexFile =
        serde_json::from_slice(&bytes).map_err(|e| CacheError::Corruption(e.to_string()))?;
    if index.format_version != FORMAT_VERSION {
        return Err(CacheError::Corruption(format!(
            "index format version {} (expected {})",
            index.format_version, FORMAT_VERSION
        )));
    }
    Ok(index.entries)
}

fn write_index(dir: &Path, entries: &BTreeMap<String, CacheEntry>) -> Result<(), CacheError> {
    let index = IndexFile {
        format_version: FORMAT_VERSION,
        entries: entries.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&index).map_err(io::Error::from)?;
    write_atomic(&dir.join(INDEX_FILE), &bytes)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
