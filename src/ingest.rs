//! Ingestion orchestration.
//!
//! For each input file, in order:
//!
//! 1. derive the display filename (basename, either separator style)
//! 2. reuse in-memory chunks if they were built from the current bytes
//! 3. otherwise adopt a valid [`ContentCache`] entry
//! 4. otherwise extract, split page by page, optionally embed, and cache
//!
//! Per-file failures never abort the batch; they are logged and reported
//! as [`FileStatus::Skipped`] in the returned [`IngestReport`].

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cache::{hash_file, CacheError, ContentCache};
use crate::chunk::SentenceSplitter;
use crate::config::Config;
use crate::embedding::{create_provider, embed_chunks, Embedder};
use crate::extract::{ExtractError, Extractor};
use crate::models::Chunk;
use crate::ocr::{DisabledOcr, OcrEngine, TesseractOcr};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::store::NodeStore;

/// Why a file contributed no chunks.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotFound,
    UnsupportedFormat(String),
    MissingDependency(String),
    ExtractionFailure(String),
    /// Extraction succeeded but produced no text.
    NoContent,
    EmbeddingFailure(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "file not found"),
            SkipReason::UnsupportedFormat(ext) => write!(f, "unsupported file type {}", ext),
            SkipReason::MissingDependency(dep) => write!(f, "missing dependency: {}", dep),
            SkipReason::ExtractionFailure(msg) => write!(f, "extraction failed: {}", msg),
            SkipReason::NoContent => write!(f, "no extractable text"),
            SkipReason::EmbeddingFailure(msg) => write!(f, "embedding failed: {}", msg),
        }
    }
}

impl From<ExtractError> for SkipReason {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnsupportedFormat(ext) => SkipReason::UnsupportedFormat(ext),
            ExtractError::MissingDependency(dep) => SkipReason::MissingDependency(dep),
            ExtractError::ExtractionFailure(msg) => SkipReason::ExtractionFailure(msg),
            ExtractError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => SkipReason::NotFound,
            ExtractError::Io(e) => SkipReason::ExtractionFailure(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    /// Reused chunks already held in memory.
    InMemory,
    CacheHit,
    Processed,
    Skipped(SkipReason),
}

impl FileStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::InMemory => "in memory",
            FileStatus::CacheHit => "cache hit",
            FileStatus::Processed => "processed",
            FileStatus::Skipped(_) => "skipped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file_name: String,
    pub path: PathBuf,
    pub status: FileStatus,
    pub chunks: usize,
}

/// Result of one [`Ingestor::ingest`] call.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Chunks of every successful file, in input order.
    pub nodes: Vec<Chunk>,
    /// One outcome per input path, in input order.
    pub outcomes: Vec<FileOutcome>,
}

impl IngestReport {
    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn processed(&self) -> usize {
        self.count(|s| *s == FileStatus::Processed)
    }

    pub fn cache_hits(&self) -> usize {
        self.count(|s| *s == FileStatus::CacheHit)
    }

    pub fn in_memory(&self) -> usize {
        self.count(|s| *s == FileStatus::InMemory)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped(_)))
    }

    pub fn outcome(&self, file_name: &str) -> Option<&FileOutcome> {
        self.outcomes.iter().find(|o| o.file_name == file_name)
    }
}

/// Basename of `path`, splitting on both `/` and `\`.
pub fn display_name(path: &Path) -> String {
    let raw = path.to_string_lossy();
    raw.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

pub struct Ingestor {
    cache: ContentCache,
    store: NodeStore,
    extractor: Extractor,
    splitter: SentenceSplitter,
    embedder: Box<dyn Embedder>,
    batch_size: usize,
    /// Successful files of the most recent `ingest` call, in request order.
    ingested: Vec<String>,
}

impl Ingestor {
    pub fn new(
        cache: ContentCache,
        extractor: Extractor,
        splitter: SentenceSplitter,
        embedder: Box<dyn Embedder>,
        batch_size: usize,
    ) -> Self {
        Self {
            cache,
            store: NodeStore::new(),
            extractor,
            splitter,
            embedder,
            batch_size,
            ingested: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let cache_dir = config.storage.cache_dir();
        let cache = ContentCache::open(&cache_dir)
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;

        let ocr: Box<dyn OcrEngine> = if config.ocr.enabled {
            Box::new(TesseractOcr::from_config(&config.ocr, &cache_dir.join("ocr-scratch")))
        } else {
            Box::new(DisabledOcr)
        };
        let extractor = Extractor::new(ocr, config.ingestion.ocr_min_chars);
        let splitter = SentenceSplitter::from_config(&config.ingestion)
            .context("Invalid ingestion.chunking_regex")?;
        let embedder = create_provider(&config.embedding)?;

        Ok(Self::new(cache, extractor, splitter, embedder, config.embedding.batch_size))
    }

    /// Ingest `paths` in order. Never fails as a whole: per-file problems
    /// become skipped outcomes.
    pub fn ingest(
        &mut self,
        paths: &[PathBuf],
        embed: bool,
        progress: &dyn IngestProgressReporter,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        if paths.is_empty() {
            return report;
        }

        self.ingested.clear();
        let total = paths.len() as u64;
        progress.report(IngestProgressEvent::Started { total });

        for (i, path) in paths.iter().enumerate() {
            let file_name = display_name(path);
            let status = match self.ingest_one(&file_name, path, embed) {
                Ok(status) => status,
                Err(reason) => {
                    warn!(file = %file_name, reason = %reason, "skipping file");
                    self.drop_outdated(&file_name, path);
                    FileStatus::Skipped(reason)
                }
            };

            let mut chunks = 0;
            if !matches!(status, FileStatus::Skipped(_)) {
                if let Some(nodes) = self.store.chunks(&file_name) {
                    chunks = nodes.len();
                    report.nodes.extend_from_slice(nodes);
                }
                self.ingested.push(file_name.clone());
            }

            progress.report(IngestProgressEvent::File {
                n: i as u64 + 1,
                total,
                file: file_name.clone(),
                status: status.label().to_string(),
            });
            report.outcomes.push(FileOutcome {
                file_name,
                path: path.clone(),
                status,
                chunks,
            });
        }

        info!(
            files = paths.len(),
            processed = report.processed(),
            cache_hits = report.cache_hits(),
            in_memory = report.in_memory(),
            skipped = report.skipped(),
            nodes = report.nodes.len(),
            "ingestion finished"
        );
        report
    }

    fn ingest_one(&mut self, file_name: &str, path: &Path, embed: bool) -> Result<FileStatus, SkipReason> {
        if !path.is_file() {
            return Err(SkipReason::NotFound);
        }
        let hash = hash_file(path).map_err(|e| SkipReason::from(ExtractError::Io(e)))?;

        if let Some(chunks) = self.store.get_fresh(file_name, &hash) {
            if !embed || chunks.iter().all(Chunk::is_embedded) {
                debug!(file = file_name, "reusing in-memory chunks");
                return Ok(FileStatus::InMemory);
            }
        }

        if let Some(mut chunks) = self.cache.lookup(file_name, path, &hash) {
            if embed && !chunks.iter().all(Chunk::is_embedded) {
                self.embed(file_name, &mut chunks)?;
                self.write_cache(file_name, &hash, &chunks);
            }
            info!(file = file_name, chunks = chunks.len(), "cache hit");
            self.store.insert(file_name, &hash, path, chunks);
            return Ok(FileStatus::CacheHit);
        }

        let mut chunks = self.process(file_name, path)?;
        if embed {
            self.embed(file_name, &mut chunks)?;
        }
        info!(file = file_name, chunks = chunks.len(), "processed");
        self.write_cache(file_name, &hash, &chunks);
        self.store.insert(file_name, &hash, path, chunks);
        Ok(FileStatus::Processed)
    }

    /// After a failed ingest, forget chunks built from bytes the file no
    /// longer has (or that no longer exist). Chunks matching the current
    /// hash are kept.
    fn drop_outdated(&mut self, file_name: &str, path: &Path) {
        let Some(doc) = self.store.get(file_name) else {
            return;
        };
        let current = hash_file(path).ok();
        if current.as_deref() == Some(doc.content_hash.as_str()) {
            return;
        }
        self.store.remove(file_name);
        info!(file = file_name, "dropped outdated chunks");
        if let Err(e) = self.cache.remove(file_name) {
            warn!(file = file_name, error = %e, "failed to drop outdated cache entry");
        }
    }

    /// Extract and split. Each PDF page is split on its own so no chunk
    /// crosses a page boundary.
    fn process(&self, file_name: &str, path: &Path) -> Result<Vec<Chunk>, SkipReason> {
        let pages = self.extractor.extract(path)?;
        let path_str = path.to_string_lossy();

        let mut chunks = Vec::new();
        for page in pages.iter().filter(|p| !p.text.is_empty()) {
            let label = page.page.map(|n| n.to_string());
            chunks.extend(
                self.splitter
                    .split_document(file_name, &path_str, label.as_deref(), &page.text),
            );
        }

        if chunks.is_empty() {
            return Err(SkipReason::NoContent);
        }
        Ok(chunks)
    }

    fn embed(&self, file_name: &str, chunks: &mut [Chunk]) -> Result<(), SkipReason> {
        match embed_chunks(self.embedder.as_ref(), chunks, self.batch_size) {
            Ok(n) => {
                debug!(file = file_name, embedded = n, "embedded chunks");
                Ok(())
            }
            Err(e) => Err(SkipReason::EmbeddingFailure(format!("{:#}", e))),
        }
    }

    /// A failed cache write costs reprocessing later, not this ingestion.
    fn write_cache(&mut self, file_name: &str, hash: &str, chunks: &[Chunk]) {
        if let Err(e) = self.cache.put_with_hash(file_name, hash, chunks) {
            warn!(file = file_name, error = %e, "failed to write cache entry");
        }
    }

    /// Chunks for each requested filename, plus the names not in the store.
    pub fn get_nodes_for_files(&self, filenames: &[String]) -> (Vec<Chunk>, Vec<String>) {
        let mut nodes = Vec::new();
        let mut missing = Vec::new();
        for name in filenames {
            match self.store.chunks(name) {
                Some(chunks) => nodes.extend_from_slice(chunks),
                None => missing.push(name.clone()),
            }
        }
        (nodes, missing)
    }

    /// Chunks of the most recent `ingest` call's successful files, in
    /// request order.
    pub fn get_ingested_nodes(&self) -> Vec<Chunk> {
        self.ingested
            .iter()
            .filter_map(|f| self.store.chunks(f))
            .flat_map(|c| c.iter().cloned())
            .collect()
    }

    pub fn get_all_nodes(&self) -> Vec<Chunk> {
        self.store.all_chunks()
    }

    pub fn check_nodes_exist(&self) -> bool {
        self.store.chunk_count() > 0
    }

    pub fn ingested_files(&self) -> &[String] {
        &self.ingested
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ContentCache {
        &mut self.cache
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Forget `filename` in memory and in the cache.
    pub fn remove_document(&mut self, filename: &str) -> Result<bool, CacheError> {
        let in_store = self.store.remove(filename).is_some();
        self.ingested.retain(|f| f != filename);
        let in_cache = self.cache.remove(filename)?;
        Ok(in_store || in_cache)
    }

    /// Drop all in-memory chunks. The cache is untouched.
    pub fn reset(&mut self) {
        self.store.clear();
        self.ingested.clear();
    }
}
