//! Query-time facade tying the registry, ingestor, retriever and citation
//! selector together.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::ingest::{IngestReport, Ingestor};
use crate::models::{Citation, CitationCandidate, SourceDocument};
use crate::progress::IngestProgressReporter;
use crate::registry::DocumentRegistry;
use crate::retrieve::{BruteForceRetriever, Retriever};
use crate::select::SourceSelector;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Nothing is ingested, so no question can be answered.
    #[error("No documents loaded")]
    NoDocumentsLoaded,
    #[error("retrieval failed: {0}")]
    Retrieval(String),
}

/// Retrieval result for one question.
#[derive(Debug, Default)]
pub struct QueryContext {
    pub candidates: Vec<CitationCandidate>,
    /// Requested document names that are not ingested.
    pub missing: Vec<String>,
}

pub struct KnowledgeBase {
    config: Config,
    ingestor: Ingestor,
    registry: DocumentRegistry,
    selector: SourceSelector,
}

impl KnowledgeBase {
    pub fn open(config: &Config) -> Result<Self> {
        let ingestor = Ingestor::from_config(config)?;
        let registry = DocumentRegistry::from_config(config)?;
        Ok(Self::from_parts(config, ingestor, registry))
    }

    pub fn from_parts(config: &Config, ingestor: Ingestor, registry: DocumentRegistry) -> Self {
        Self {
            config: config.clone(),
            ingestor,
            registry,
            selector: SourceSelector::from_config(&config.citation),
        }
    }

    /// Ingest every registered document still on disk.
    pub fn load_registered(&mut self, progress: &dyn IngestProgressReporter) -> IngestReport {
        let paths = self.registry.existing_paths();
        info!(documents = paths.len(), "loading registered documents");
        self.ingest(&paths, self.config.embedding.is_enabled(), progress)
    }

    pub fn ingest(
        &mut self,
        paths: &[PathBuf],
        embed: bool,
        progress: &dyn IngestProgressReporter,
    ) -> IngestReport {
        self.ingestor.ingest(paths, embed, progress)
    }

    /// Copy `src` into the managed directory, register it and ingest it.
    pub fn add_document(
        &mut self,
        src: &Path,
        embed: bool,
        progress: &dyn IngestProgressReporter,
    ) -> Result<(SourceDocument, IngestReport)> {
        let doc = self
            .registry
            .register_upload(src)
            .with_context(|| format!("Failed to register {}", src.display()))?;
        let path = self.registry.path_of(&doc);
        let report = self.ingestor.ingest(&[path], embed, progress);
        Ok((doc, report))
    }

    /// Remove a document from the registry, disk, node store and cache.
    pub fn remove_document(&mut self, filename: &str) -> Result<bool> {
        let registered = self.registry.remove(filename)?.is_some();
        let indexed = self.ingestor.remove_document(filename)?;
        Ok(registered || indexed)
    }

    /// Rank ingested chunks against `question`. A non-empty `only`
    /// restricts retrieval to those documents (stored or original names).
    pub fn retrieve(&self, question: &str, only: &[String]) -> Result<QueryContext, PipelineError> {
        if !self.ingestor.check_nodes_exist() {
            return Err(PipelineError::NoDocumentsLoaded);
        }

        let (nodes, missing) = if only.is_empty() {
            (self.ingestor.get_all_nodes(), Vec::new())
        } else {
            let names = self.resolve_names(only);
            self.ingestor.get_nodes_for_files(&names)
        };
        if nodes.is_empty() {
            debug!(?missing, "no nodes for requested documents");
            return Ok(QueryContext {
                candidates: Vec::new(),
                missing,
            });
        }

        let candidates = BruteForceRetriever::new(self.ingestor.embedder())
            .retrieve(question, &nodes, self.config.retrieval.similarity_top_k)
            .map_err(|e| PipelineError::Retrieval(format!("{:#}", e)))?;
        Ok(QueryContext { candidates, missing })
    }

    /// Citations for `answer` using the configured `max_sources`.
    pub fn cite(&self, answer: &str, candidates: &[CitationCandidate]) -> Vec<Citation> {
        self.selector
            .select_sources(answer, candidates, self.config.citation.max_sources)
    }

    /// Map original upload names to stored names; unknown names pass through.
    fn resolve_names(&self, names: &[String]) -> Vec<String> {
        let mut resolved = Vec::new();
        for name in names {
            if self.ingestor.store().contains(name) {
                resolved.push(name.clone());
                continue;
            }
            let stored = self.registry.find_by_original(name);
            if stored.is_empty() {
                resolved.push(name.clone());
            } else {
                resolved.extend(stored.into_iter().map(|d| d.filename.clone()));
            }
        }
        resolved
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn ingestor_mut(&mut self) -> &mut Ingestor {
        &mut self.ingestor
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }
}
