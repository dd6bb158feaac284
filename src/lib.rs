//! # edgequake-drafter
//!
//! Draft, import and edit contract templates with generative models.
//!
//! ## Why this crate?
//!
//! Legacy contracts mostly exist as scans. This crate rasterises them,
//! lets a vision model reconstruct each batch of pages as HTML with every
//! case-specific value replaced by an `xxxx_NAME` placeholder, and merges
//! the batches into one reusable template. The same model seam drives
//! guided drafting and scoped follow-up edits.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image
//!  │
//!  ├─ 1. Input       resolve local file or download from URL, sniff kind
//!  ├─ 2. Chunk       rasterise pages via pdfium, 3 pages per batch
//!  ├─ 3. Extract     one vision call per batch → HTML fragment (sequential, paced)
//!  ├─ 4. Synthesize  merge fragments → { title, html }
//!  └─ 5. Template    ContractTemplate with derived placeholders
//! ```
//!
//! Every model call goes through bounded exponential backoff on rate
//! limiting. An ingestion run is all-or-nothing: one failed batch fails the
//! run and no partial document is returned.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_drafter::{import_template, DraftConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = DraftConfig::default();
//!     let template = import_template("scan.pdf", &config).await?;
//!     println!("{}: {:?}", template.title, template.unique_placeholders());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `drafter` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod template;
pub mod wizard;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DraftConfig, DraftConfigBuilder, DEFAULT_MODEL};
pub use error::{DraftError, FailureHint, ModelError, RateLimitSignal};
pub use ingest::{
    extract_page_image, import_template, import_template_sync, ingest, ingest_chunks,
    ingest_source, process_single_image, synthesize_fragments, IngestState,
};
pub use model::{
    resolve_model, EdgequakeModel, GenerativeModel, ImagePayload, ModelReply, ModelRequest,
    OutputSchema,
};
pub use pipeline::chunk::{chunk_pages, ChunkedDocument, PageChunk, PageSource};
pub use pipeline::edit::{edit_document, edit_template};
pub use pipeline::input::{resolve_input, DocumentKind, SourceDocument};
pub use pipeline::synthesize::SynthesizedDocument;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use template::{derive_placeholders, placeholder_label, word_document, ContractTemplate};
pub use wizard::{generate_questions, generate_template, FixedAnswers, WizardSession};
