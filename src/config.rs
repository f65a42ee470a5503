//! TOML configuration parsing and validation.
//!
//! A minimal `docrag.toml`:
//!
//! ```toml
//! [storage]
//! data_dir = "./data/data"
//!
//! [ingestion]
//! chunk_size = 800
//! chunk_overlap = 100
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//! ```
//!
//! Every section except `[storage]` may be omitted.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub citation: CitationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Managed directory uploads are copied into.
    pub data_dir: PathBuf,
    /// Cache directory. Defaults to `<data_dir>/.cache`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Upload registry manifest. Defaults to `<data_dir>/registry.json`.
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(".cache"))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("registry.json"))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Target chunk size in (approximate) tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_paragraph_separator")]
    pub paragraph_separator: String,
    /// Secondary splitting regex, applied when a paragraph is too large.
    #[serde(default = "default_chunking_regex")]
    pub chunking_regex: String,
    /// PDFs whose text layer yields fewer characters than this are treated
    /// as scanned and sent through OCR.
    #[serde(default = "default_ocr_min_chars")]
    pub ocr_min_chars: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            paragraph_separator: default_paragraph_separator(),
            chunking_regex: default_chunking_regex(),
            ocr_min_chars: default_ocr_min_chars(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_paragraph_separator() -> String {
    "\n \n".to_string()
}
fn default_chunking_regex() -> String {
    "[^,.;。？！]+[,.;。？！]?".to_string()
}
fn default_ocr_min_chars() -> usize {
    100
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.markdown".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_pdftoppm_cmd")]
    pub pdftoppm_cmd: String,
    #[serde(default = "default_ocr_language")]
    pub language: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tesseract_cmd: default_tesseract_cmd(),
            pdftoppm_cmd: default_pdftoppm_cmd(),
            language: default_ocr_language(),
            dpi: default_dpi(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}
fn default_pdftoppm_cmd() -> String {
    "pdftoppm".to_string()
}
fn default_ocr_language() -> String {
    "eng".to_string()
}
fn default_dpi() -> u32 {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 32,
            max_retries: 3,
            timeout_secs: 300,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    300
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CitationConfig {
    /// Size of the re-ranked window taken from the top of the retrieval list.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    /// Answer words shorter than this are ignored for alignment.
    #[serde(default = "default_min_word_len")]
    pub min_word_len: usize,
    #[serde(default = "default_alignment_weight")]
    pub alignment_weight: f64,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default = "default_sentence_cut_ratio")]
    pub sentence_cut_ratio: f64,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            max_sources: default_max_sources(),
            min_word_len: default_min_word_len(),
            alignment_weight: default_alignment_weight(),
            excerpt_chars: default_excerpt_chars(),
            sentence_cut_ratio: default_sentence_cut_ratio(),
        }
    }
}

fn default_top_n() -> usize {
    3
}
fn default_max_sources() -> usize {
    1
}
fn default_min_word_len() -> usize {
    4
}
fn default_alignment_weight() -> f64 {
    10.0
}
fn default_excerpt_chars() -> usize {
    400
}
fn default_sentence_cut_ratio() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: default_similarity_top_k(),
        }
    }
}

fn default_similarity_top_k() -> usize {
    4
}

impl Config {
    /// Defaults rooted at `data_dir`, used when no config file exists.
    pub fn minimal(data_dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                data_dir: data_dir.to_path_buf(),
                cache_dir: None,
                registry_path: None,
            },
            ingestion: IngestionConfig::default(),
            ocr: OcrConfig::default(),
            embedding: EmbeddingConfig::default(),
            citation: CitationConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ing = &self.ingestion;
        if ing.chunk_size == 0 {
            bail!("ingestion.chunk_size must be > 0");
        }
        if ing.chunk_overlap >= ing.chunk_size {
            bail!(
                "ingestion.chunk_overlap ({}) must be smaller than chunk_size ({})",
                ing.chunk_overlap,
                ing.chunk_size
            );
        }
        if ing.paragraph_separator.is_empty() {
            bail!("ingestion.paragraph_separator must not be empty");
        }
        regex::Regex::new(&ing.chunking_regex)
            .with_context(|| format!("Invalid ingestion.chunking_regex: {}", ing.chunking_regex))?;

        let cit = &self.citation;
        if cit.top_n == 0 {
            bail!("citation.top_n must be >= 1");
        }
        if cit.max_sources == 0 {
            bail!("citation.max_sources must be >= 1");
        }
        if !(0.0..=1.0).contains(&cit.sentence_cut_ratio) {
            bail!("citation.sentence_cut_ratio must be in [0.0, 1.0]");
        }

        if self.retrieval.similarity_top_k == 0 {
            bail!("retrieval.similarity_top_k must be >= 1");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    );
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg = parse("[storage]\ndata_dir = \"/tmp/kb\"\n").unwrap();
        assert_eq!(cfg.ingestion.chunk_size, 800);
        assert_eq!(cfg.ingestion.chunk_overlap, 100);
        assert_eq!(cfg.ingestion.ocr_min_chars, 100);
        assert_eq!(cfg.citation.top_n, 3);
        assert_eq!(cfg.storage.cache_dir(), PathBuf::from("/tmp/kb/.cache"));
        assert_eq!(
            cfg.storage.registry_path(),
            PathBuf::from("/tmp/kb/registry.json")
        );
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = parse(
            "[storage]\ndata_dir = \"/tmp/kb\"\n[ingestion]\nchunk_size = 50\nchunk_overlap = 50\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn bad_regex_rejected() {
        let err = parse(
            "[storage]\ndata_dir = \"/tmp/kb\"\n[ingestion]\nchunking_regex = \"[unclosed\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunking_regex"));
    }

    #[test]
    fn enabled_provider_requires_model_and_dims() {
        let err = parse("[storage]\ndata_dir = \"/tmp/kb\"\n[embedding]\nprovider = \"ollama\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = parse("[storage]\ndata_dir = \"/tmp/kb\"\n[embedding]\nprovider = \"gemini\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn minimal_config_is_valid() {
        let cfg = Config::minimal(Path::new("/tmp/kb"));
        cfg.validate().unwrap();
    }

    #[test]
    fn example_config_parses() {
        let cfg = parse(include_str!("../config/docrag.example.toml")).unwrap();
        assert_eq!(cfg.ingestion.paragraph_separator, "\n \n");
        assert_eq!(cfg.ingestion.include_globs.len(), 5);
        assert_eq!(cfg.ocr.dpi, 200);
        assert!(!cfg.embedding.is_enabled());
    }
}
