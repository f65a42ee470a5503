//! `docrag add | remove | list | ingest | sync | nodes`.
//!
//! Every invocation is a fresh process, so commands that need chunks in
//! memory ingest first. The content cache makes that cheap: unchanged
//! files come back as `cache hit` without touching the extractor.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::config::Config;
use crate::ingest::{FileStatus, IngestReport};
use crate::pipeline::KnowledgeBase;
use crate::progress::ProgressMode;
use crate::registry::scan_data_dir;

/// One stdout line per file, then a summary line.
pub fn print_report(report: &IngestReport) {
    for outcome in &report.outcomes {
        match &outcome.status {
            FileStatus::Skipped(reason) => {
                println!("skipped    {}  ({})", outcome.file_name, reason);
            }
            status => {
                println!(
                    "{:<10} {}  ({} chunks)",
                    status.label(),
                    outcome.file_name,
                    outcome.chunks
                );
            }
        }
    }
    println!(
        "ingest ok: {} processed, {} cache hits, {} in memory, {} skipped, {} chunks",
        report.processed(),
        report.cache_hits(),
        report.in_memory(),
        report.skipped(),
        report.nodes.len()
    );
}

pub fn run_add(config: &Config, file: &Path, embed: bool, progress: ProgressMode) -> Result<()> {
    let mut kb = KnowledgeBase::open(config)?;
    let (doc, report) = kb.add_document(file, embed && config.embedding.is_enabled(), progress.reporter().as_ref())?;
    println!("added {} as {}", doc.original_filename, doc.filename);
    print_report(&report);
    Ok(())
}

pub fn run_remove(config: &Config, name: &str) -> Result<()> {
    let mut kb = KnowledgeBase::open(config)?;
    let stored: Vec<String> = if kb.registry().get(name).is_some() {
        vec![name.to_string()]
    } else {
        kb.registry()
            .find_by_original(name)
            .into_iter()
            .map(|d| d.filename.clone())
            .collect()
    };

    match stored.as_slice() {
        [] => {
            // Not registered; may still have a cache entry from `sync`.
            if kb.remove_document(name)? {
                println!("removed {}", name);
                Ok(())
            } else {
                bail!("Unknown document: {}", name)
            }
        }
        [one] => {
            kb.remove_document(one)?;
            println!("removed {}", one);
            Ok(())
        }
        many => bail!(
            "{} matches several uploads, remove one by stored name: {}",
            name,
            many.join(", ")
        ),
    }
}

pub fn run_list(config: &Config) -> Result<()> {
    let kb = KnowledgeBase::open(config)?;
    let docs = kb.registry().documents();
    if docs.is_empty() {
        println!("No documents registered.");
        return Ok(());
    }

    println!("{:<44} {:<24} {:>10}  {}", "FILENAME", "ORIGINAL", "BYTES", "CACHE");
    for doc in docs {
        let path = kb.registry().path_of(doc);
        let cache = kb
            .ingestor()
            .cache()
            .status(&doc.filename, &path)
            .map(|s| s.to_string())
            .unwrap_or_else(|e| format!("error: {}", e));
        println!(
            "{:<44} {:<24} {:>10}  {}",
            doc.filename, doc.original_filename, doc.file_size, cache
        );
    }
    Ok(())
}

/// Ingest explicit paths, or every registered document when none are given.
pub fn run_ingest(config: &Config, paths: &[PathBuf], embed: bool, progress: ProgressMode) -> Result<()> {
    let mut kb = KnowledgeBase::open(config)?;
    let embed = embed && config.embedding.is_enabled();
    let reporter = progress.reporter();
    let report = if paths.is_empty() {
        let registered = kb.registry().existing_paths();
        kb.ingest(&registered, embed, reporter.as_ref())
    } else {
        kb.ingest(paths, embed, reporter.as_ref())
    };
    print_report(&report);
    Ok(())
}

/// Ingest every supported file under `storage.data_dir`.
pub fn run_sync(config: &Config, embed: bool, progress: ProgressMode) -> Result<()> {
    let paths = scan_data_dir(config)?;
    if paths.is_empty() {
        println!("No supported files under {}", config.storage.data_dir.display());
        return Ok(());
    }
    run_ingest(config, &paths, embed, progress)
}

/// Print the chunks of the named documents after loading the registry.
pub fn run_nodes(config: &Config, names: &[String], progress: ProgressMode) -> Result<()> {
    let mut kb = KnowledgeBase::open(config)?;
    kb.load_registered(progress.reporter().as_ref());

    let (nodes, missing) = if names.is_empty() {
        (kb.ingestor().get_all_nodes(), Vec::new())
    } else {
        kb.ingestor().get_nodes_for_files(names)
    };
    for name in &missing {
        eprintln!("warning: document not ingested: {}", name);
    }

    for node in &nodes {
        let preview: String = node.text.chars().take(80).collect();
        println!(
            "{}  {}  page={}  #{}  {}{}",
            node.id,
            node.file_name,
            node.page_label.as_deref().unwrap_or("-"),
            node.chunk_index,
            preview.replace('\n', " "),
            if node.text.chars().count() > 80 { "..." } else { "" }
        );
    }
    println!("{} nodes", nodes.len());
    Ok(())
}
