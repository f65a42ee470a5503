//! `docrag cache status | clear`.

use std::collections::BTreeSet;

use anyhow::{Context, Result};

use crate::cache::ContentCache;
use crate::config::Config;
use crate::ingest::display_name;
use crate::registry::scan_data_dir;

fn open_cache(config: &Config) -> Result<ContentCache> {
    let dir = config.storage.cache_dir();
    ContentCache::open(&dir).with_context(|| format!("Failed to open cache at {}", dir.display()))
}

/// Status of every supported file in `data_dir`, then cache entries whose
/// file is gone.
pub fn run_status(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    println!("cache: {}", cache.dir().display());

    let files = if config.storage.data_dir.exists() {
        scan_data_dir(config)?
    } else {
        Vec::new()
    };

    let mut seen = BTreeSet::new();
    for path in &files {
        let name = display_name(path);
        let status = match cache.status(&name, path) {
            Ok(s) => s.to_string(),
            Err(e) => format!("error ({})", e),
        };
        let chunks = cache
            .entry(&name)
            .map(|e| e.chunk_count.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<8} {}  chunks={}", status, name, chunks);
        seen.insert(name);
    }

    for (name, entry) in cache.entries() {
        if !seen.contains(name) {
            println!("{:<8} {}  chunks={}", "orphan", name, entry.chunk_count);
        }
    }
    println!("{} entries", cache.len());
    Ok(())
}

pub fn run_clear(config: &Config) -> Result<()> {
    let mut cache = open_cache(config)?;
    let removed = cache.clear().context("Failed to clear cache")?;
    println!("cleared {} cache entries", removed);
    Ok(())
}
