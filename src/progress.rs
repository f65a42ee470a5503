//! Ingestion progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts.
//! `--progress human` prints one line per file, `--progress json` prints
//! one JSON object per line, `--progress off` prints nothing. The default
//! is human when stderr is a TTY.

use std::io::Write;

/// A single progress event emitted by [`Ingestor::ingest`](crate::ingest::Ingestor::ingest).
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// A batch of `total` files is about to be ingested.
    Started { total: u64 },
    /// File `n` of `total` finished with `status` (`processed`, `cache hit`, ...).
    File {
        n: u64,
        total: u64,
        file: String,
        status: String,
    },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// "ingest  3 / 12 files  report.pdf  cache hit"
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Started { total } => {
                format!("ingest  {} files\n", format_number(*total))
            }
            IngestProgressEvent::File {
                n,
                total,
                file,
                status,
            } => format!(
                "ingest  {} / {} files  {}  {}\n",
                format_number(*n),
                format_number(*total),
                file,
                status
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Started { total } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "total": total
            }),
            IngestProgressEvent::File {
                n,
                total,
                file,
                status,
            } => serde_json::json!({
                "event": "progress",
                "phase": "file",
                "n": n,
                "total": total,
                "file": file,
                "status": status
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
