//! # docrag
//!
//! Document ingestion, content-hash caching and citation selection for a
//! knowledge-base chatbot.
//!
//! Uploaded files (PDF, DOCX, plain text / Markdown) are turned into
//! sentence-aware chunks. Chunks are cached on disk keyed by file name and
//! SHA-256 of the file bytes, so a restart re-ingests unchanged files
//! without extracting them again. At answer time, the retrieved candidates
//! are re-ranked by how well they support the generated answer and the
//! best one is cited.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ Registry │──▶│ Extractor │──▶│ Splitter │──▶│ Embedder │
//! │ uploads  │   │ PDF/OCR/  │   │ sentence │   │ optional │
//! └──────────┘   │ DOCX/text │   └──────────┘   └────┬─────┘
//!                └───────────┘                       │
//!                      ┌─────────────────────────────┤
//!                      ▼                             ▼
//!                ┌───────────┐                 ┌───────────┐
//!                │  Content  │                 │ NodeStore │──▶ Retriever ──▶ SourceSelector
//!                │   Cache   │                 │ in memory │
//!                └───────────┘                 └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Strips characters outside the allow-list (ASCII, Latin extended, Vietnamese, punctuation) and collapses whitespace |
//! | [`extract`] | Per-format text extraction |
//! | [`ocr`] | OCR capability (pdftoppm + tesseract) |
//! | [`chunk`] | Sentence splitter |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`cache`] | On-disk content cache |
//! | [`store`] | In-memory node store |
//! | [`ingest`] | Cache-aware ingestion |
//! | [`select`] | Citation selection |
//! | [`retrieve`] | Reference retriever |
//! | [`registry`] | Upload registry and data-dir scan |
//! | [`pipeline`] | Query-time facade |
//! | [`progress`] | Ingestion progress reporting |
//! | [`logging`] | Tracing subscriber setup |

pub mod ask_cmd;
pub mod cache;
pub mod cache_cmd;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod ingest_cmd;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod retrieve;
pub mod select;
pub mod store;
