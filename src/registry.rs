//! Upload registry and managed-directory scanning.
//!
//! Uploaded files are copied into `storage.data_dir` under a stored name
//! of the form `<uuid>_<original basename>`. Stored names are therefore
//! unique, and since the content cache is keyed by basename, two uploads
//! of `report.pdf` never share a cache entry.
//!
//! The registry itself is a JSON manifest (`registry.json` by default):
//!
//! ```json
//! { "documents": [ { "filename": "3f2a..._report.pdf", "original_filename": "report.pdf", ... } ] }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cache::hash_file;
use crate::config::Config;
use crate::extract::DocumentFormat;
use crate::ingest::display_name;
use crate::models::SourceDocument;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    documents: Vec<SourceDocument>,
}

pub struct DocumentRegistry {
    path: PathBuf,
    data_dir: PathBuf,
    docs: Vec<SourceDocument>,
}

impl DocumentRegistry {
    /// Load the manifest at `path`; a missing file is an empty registry.
    pub fn open(path: &Path, data_dir: &Path) -> Result<Self> {
        let docs = match fs::read_to_string(path) {
            Ok(raw) => {
                let file: RegistryFile = serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse registry: {}", path.display()))?;
                file.documents
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read registry: {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            data_dir: data_dir.to_path_buf(),
            docs,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(&config.storage.registry_path(), &config.storage.data_dir)
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.docs
    }

    pub fn get(&self, filename: &str) -> Option<&SourceDocument> {
        self.docs.iter().find(|d| d.filename == filename)
    }

    /// Stored file names whose original upload name is `original`.
    pub fn find_by_original(&self, original: &str) -> Vec<&SourceDocument> {
        self.docs
            .iter()
            .filter(|d| d.original_filename == original)
            .collect()
    }

    pub fn path_of(&self, doc: &SourceDocument) -> PathBuf {
        self.data_dir.join(&doc.filename)
    }

    /// Copy `src` into the managed directory and record it.
    pub fn register_upload(&mut self, src: &Path) -> Result<SourceDocument> {
        if !src.is_file() {
            bail!("Not a file: {}", src.display());
        }
        DocumentFormat::from_path(src)?;

        let original_filename = display_name(src);
        let filename = format!("{}_{}", uuid::Uuid::new_v4().simple(), original_filename);
        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create data dir: {}", self.data_dir.display()))?;
        let dest = self.data_dir.join(&filename);
        let file_size = fs::copy(src, &dest)
            .with_context(|| format!("Failed to copy {} into {}", src.display(), dest.display()))?;

        let doc = SourceDocument {
            filename,
            original_filename,
            extension: src
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            file_size,
            content_hash: hash_file(&dest)?,
            uploaded_at: Utc::now(),
        };
        self.docs.push(doc.clone());
        self.save()?;

        info!(file = %doc.filename, original = %doc.original_filename, bytes = file_size, "registered upload");
        Ok(doc)
    }

    /// Delete the registry row and the stored file.
    pub fn remove(&mut self, filename: &str) -> Result<Option<SourceDocument>> {
        let Some(pos) = self.docs.iter().position(|d| d.filename == filename) else {
            return Ok(None);
        };
        let doc = self.docs.remove(pos);
        let path = self.path_of(&doc);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(file = %path.display(), "stored file already gone");
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
        self.save()?;
        Ok(Some(doc))
    }

    /// Paths of registered documents present on disk, in upload order.
    pub fn existing_paths(&self) -> Vec<PathBuf> {
        self.docs
            .iter()
            .filter_map(|doc| {
                let path = self.path_of(doc);
                if path.is_file() {
                    Some(path)
                } else {
                    warn!(file = %doc.filename, "registered document missing from disk");
                    None
                }
            })
            .collect()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = RegistryFile {
            documents: self.docs.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write registry: {}", self.path.display()))?;
        Ok(())
    }
}

/// Supported files under `storage.data_dir`, sorted by path. The cache
/// directory is never descended into.
pub fn scan_data_dir(config: &Config) -> Result<Vec<PathBuf>> {
    let root = &config.storage.data_dir;
    if !root.exists() {
        bail!("data_dir does not exist: {}", root.display());
    }
    let include = build_globset(&config.ingestion.include_globs)?;
    let cache_dir = config.storage.cache_dir();

    let mut paths = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.path() != cache_dir);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if include.is_match(relative) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Invalid include glob: {}", pattern))?,
        );
    }
    Ok(builder.build()?)
}
