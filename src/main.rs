//! # docrag CLI
//!
//! The `docrag` binary manages the document side of a knowledge-base
//! chatbot: uploads, ingestion with a content-hash cache, retrieval and
//! citation selection. Answer generation is left to the caller.
//!
//! ## Usage
//!
//! ```bash
//! docrag --config ./docrag.toml <command>
//! ```
//!
//! Without `--config`, `./docrag.toml` is used when present; otherwise the
//! defaults apply with `./data` as the managed directory.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docrag add <file>` | Copy a file into the managed directory and ingest it |
//! | `docrag remove <name>` | Delete an upload, its chunks and its cache entry |
//! | `docrag list` | List registered uploads with their cache status |
//! | `docrag ingest [paths..]` | Ingest paths (default: all registered uploads) |
//! | `docrag sync` | Ingest every supported file under `data_dir` |
//! | `docrag nodes [names..]` | Print the chunks of ingested documents |
//! | `docrag cache status` | Show valid / stale / missing cache entries |
//! | `docrag cache clear` | Drop every cache entry |
//! | `docrag ask "<question>" --answer "<text>"` | Retrieve and cite |
//! | `docrag cite --answer "<text>" --candidates <json>` | Cite a given candidate list |
//!
//! ## Examples
//!
//! ```bash
//! # Upload and ingest a report
//! docrag add ~/Downloads/q3-report.pdf
//!
//! # Re-ingest everything; unchanged files are cache hits
//! docrag ingest
//!
//! # Cite an answer against one document
//! docrag ask "How did revenue change?" --answer "Revenue grew 12%." --doc q3-report.pdf
//! ```

use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use docrag::config::{self, Config};
use docrag::progress::ProgressMode;
use docrag::{ask_cmd, cache_cmd, ingest_cmd, logging};

const DEFAULT_CONFIG: &str = "./docrag.toml";
const DEFAULT_DATA_DIR: &str = "./data";

/// docrag: document ingestion, caching and citation selection.
#[derive(Parser)]
#[command(
    name = "docrag",
    about = "Document ingestion, content-hash caching and citation selection for a knowledge-base chatbot",
    version,
    long_about = "docrag extracts text from PDF, DOCX and plain-text uploads (with OCR fallback for \
    scanned PDFs), splits it into sentence-aware chunks, caches the chunks keyed by file content hash, \
    and picks the source chunks that best support a generated answer."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./docrag.toml` when it exists, otherwise built-in
    /// defaults rooted at `./data`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ingestion progress on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    /// Debug logging (ignored when `RUST_LOG` is set).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file.
    ///
    /// Copies the file into the managed directory under a unique stored
    /// name, records it in the registry and ingests it.
    Add {
        file: PathBuf,

        /// Skip embedding even when a provider is configured.
        #[arg(long)]
        no_embed: bool,
    },

    /// Remove an upload by stored or original name.
    ///
    /// Deletes the registry row, the stored file and its cache entry.
    Remove { name: String },

    /// List registered uploads.
    List,

    /// Ingest files into the node store.
    ///
    /// Each file is reported as `processed`, `cache hit` or `skipped`.
    /// With no paths, every registered upload is ingested.
    Ingest {
        paths: Vec<PathBuf>,

        /// Skip embedding even when a provider is configured.
        #[arg(long)]
        no_embed: bool,
    },

    /// Ingest every supported file under `storage.data_dir`.
    Sync {
        /// Skip embedding even when a provider is configured.
        #[arg(long)]
        no_embed: bool,
    },

    /// Print chunks of ingested documents (all when no names are given).
    Nodes { names: Vec<String> },

    /// Inspect or clear the content cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Retrieve context for a question and cite an answer against it.
    Ask {
        question: String,

        /// The generated answer to find sources for.
        #[arg(long)]
        answer: String,

        /// Restrict retrieval to these documents (repeatable).
        #[arg(long = "doc")]
        docs: Vec<String>,

        /// Print citations as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run citation selection over a candidate list.
    ///
    /// Candidates are a JSON array of
    /// `{"file_name", "page_label"?, "text", "score"}` objects given inline,
    /// as a file path, or `-` for stdin.
    Cite {
        #[arg(long)]
        answer: String,

        #[arg(long)]
        candidates: String,

        /// Print citations as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the cache state of every file in the managed directory.
    Status,
    /// Remove every cache entry and artifact.
    Clear,
}

/// Explicit `--config` must load; the implicit default is optional.
fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => config::load_config(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG);
            if default.exists() {
                config::load_config(default)
            } else {
                Ok(Config::minimal(Path::new(DEFAULT_DATA_DIR)))
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "docrag", &mut io::stdout());
        return Ok(());
    }

    let cfg = resolve_config(cli.config.as_deref())?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Add { file, no_embed } => {
            ingest_cmd::run_add(&cfg, &file, !no_embed, progress)?;
        }
        Commands::Remove { name } => {
            ingest_cmd::run_remove(&cfg, &name)?;
        }
        Commands::List => {
            ingest_cmd::run_list(&cfg)?;
        }
        Commands::Ingest { paths, no_embed } => {
            ingest_cmd::run_ingest(&cfg, &paths, !no_embed, progress)?;
        }
        Commands::Sync { no_embed } => {
            ingest_cmd::run_sync(&cfg, !no_embed, progress)?;
        }
        Commands::Nodes { names } => {
            ingest_cmd::run_nodes(&cfg, &names, progress)?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Status => cache_cmd::run_status(&cfg)?,
            CacheAction::Clear => cache_cmd::run_clear(&cfg)?,
        },
        Commands::Ask {
            question,
            answer,
            docs,
            json,
        } => {
            ask_cmd::run_ask(&cfg, &question, &answer, &docs, json, progress)?;
        }
        Commands::Cite {
            answer,
            candidates,
            json,
        } => {
            ask_cmd::run_cite(&cfg, &answer, &candidates, json)?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
