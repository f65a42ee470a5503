//! `docrag ask` and `docrag cite`.
//!
//! Neither command generates an answer: `ask` retrieves context for a
//! question and cites the supplied `--answer` against it, `cite` runs
//! citation selection over a caller-supplied candidate list.

use std::io::Read;

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::models::{Chunk, Citation, CitationCandidate};
use crate::pipeline::KnowledgeBase;
use crate::progress::ProgressMode;
use crate::select::SourceSelector;

/// One entry of the `cite --candidates` JSON array.
#[derive(Debug, Deserialize)]
pub struct CandidateInput {
    pub file_name: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub page_label: Option<String>,
    pub text: String,
    pub score: f64,
}

impl CandidateInput {
    fn into_candidate(self, index: usize) -> CitationCandidate {
        let hash = hex::encode(Sha256::digest(self.text.as_bytes()));
        CitationCandidate {
            chunk: Chunk {
                id: format!("input-{}", index),
                file_path: self.file_path.unwrap_or_else(|| self.file_name.clone()),
                file_name: self.file_name,
                page_label: self.page_label,
                chunk_index: index as u32,
                text: self.text,
                hash,
                embedding: None,
            },
            score: self.score,
        }
    }
}

/// Parse candidates from inline JSON, `-` (stdin), or a file path.
pub fn read_candidates(arg: &str) -> Result<Vec<CitationCandidate>> {
    let raw = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read candidates from stdin")?;
        buf
    } else if arg.trim_start().starts_with('[') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read candidates file: {}", arg))?
    };

    let inputs: Vec<CandidateInput> = serde_json::from_str(&raw).context("Invalid candidates JSON")?;
    Ok(inputs
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.into_candidate(i))
        .collect())
}

fn print_citations(citations: &[Citation], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(citations)?);
        return Ok(());
    }
    if citations.is_empty() {
        println!("No sources.");
        return Ok(());
    }
    for (i, c) in citations.iter().enumerate() {
        let page = c.page.as_deref().map(|p| format!(" p.{}", p)).unwrap_or_default();
        println!(
            "[{}] {}{}  score={:.3} alignment={} combined={:.3}",
            i + 1,
            c.filename,
            page,
            c.score,
            c.alignment,
            c.combined_score
        );
        println!("    {}", c.text.replace('\n', " "));
    }
    Ok(())
}

pub fn run_ask(
    config: &Config,
    question: &str,
    answer: &str,
    docs: &[String],
    json: bool,
    progress: ProgressMode,
) -> Result<()> {
    let mut kb = KnowledgeBase::open(config)?;
    kb.load_registered(progress.reporter().as_ref());

    let ctx = kb.retrieve(question, docs)?;
    for name in &ctx.missing {
        eprintln!("warning: document not ingested: {}", name);
    }
    let citations = kb.cite(answer, &ctx.candidates);
    print_citations(&citations, json)
}

pub fn run_cite(config: &Config, answer: &str, candidates: &str, json: bool) -> Result<()> {
    let candidates = read_candidates(candidates)?;
    let selector = SourceSelector::from_config(&config.citation);
    let citations = selector.select_sources(answer, &candidates, config.citation.max_sources);
    print_citations(&citations, json)
}
