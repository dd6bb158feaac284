//! Document ingestion: the orchestration flow from source document to a
//! synthesized `{title, html}` and on to a [`ContractTemplate`].
//!
//! ## States
//!
//! ```text
//! idle ─► chunking ─► extracting(0) ─► pausing(0) ─► extracting(1) ─► … ─► synthesizing ─► done
//! idle ─► extracting_single ───────────────────────────────────────────► synthesizing ─► done
//!                              any failure ─► failed
//! ```
//!
//! Extraction is strictly sequential: chunk *i+1* is not requested until
//! chunk *i* has come back and the pacing pause has elapsed. Fragments
//! accumulate in page order and are owned by the run; on any failure they
//! are dropped and only the error is returned.

use crate::config::DraftConfig;
use crate::error::{DraftError, FailureHint};
use crate::model::{resolve_model, GenerativeModel, ImagePayload};
use crate::pipeline::chunk::ChunkedDocument;
use crate::pipeline::encode::encode_bytes;
use crate::pipeline::extract::extract_chunk;
use crate::pipeline::input::{resolve_input, DocumentKind, SourceDocument};
use crate::pipeline::render::chunk_pdf;
use crate::pipeline::synthesize::{synthesize, SynthesizedDocument};
use crate::template::ContractTemplate;
use futures::StreamExt;
use std::fmt;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Where an ingestion run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestState {
    Idle,
    /// Opening the document and computing batches.
    Chunking,
    /// Extracting chunk `chunk` (0-based) of `total`.
    Extracting { chunk: usize, total: usize },
    /// Cooperative pause after chunk `chunk`.
    Pausing { chunk: usize, total: usize },
    /// Extracting a single-image source.
    ExtractingSingle,
    Synthesizing,
    Done { title: String },
    Failed { message: String, hint: FailureHint },
}

impl IngestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestState::Done { .. } | IngestState::Failed { .. })
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestState::Idle => write!(f, "idle"),
            IngestState::Chunking => write!(f, "chunking"),
            IngestState::Extracting { chunk, total } => {
                write!(f, "extracting chunk {}/{}", chunk + 1, total)
            }
            IngestState::Pausing { chunk, total } => {
                write!(f, "pausing after chunk {}/{}", chunk + 1, total)
            }
            IngestState::ExtractingSingle => write!(f, "extracting single image"),
            IngestState::Synthesizing => write!(f, "synthesizing"),
            IngestState::Done { title } => write!(f, "done: {}", title),
            IngestState::Failed { message, .. } => write!(f, "failed: {}", message),
        }
    }
}

/// State reporting for one run.
struct Run<'a> {
    config: &'a DraftConfig,
    started: Instant,
}

impl<'a> Run<'a> {
    fn start(config: &'a DraftConfig) -> Self {
        let run = Self {
            config,
            started: Instant::now(),
        };
        run.enter(IngestState::Idle);
        run
    }

    fn enter(&self, state: IngestState) {
        debug!("ingest → {}", state);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_state(&state);
        }
    }

    fn finish(
        self,
        result: Result<SynthesizedDocument, DraftError>,
    ) -> Result<SynthesizedDocument, DraftError> {
        match &result {
            Ok(doc) => {
                info!(
                    "Ingestion complete: '{}' ({} chars) in {}ms",
                    doc.title,
                    doc.html.len(),
                    self.started.elapsed().as_millis()
                );
                self.enter(IngestState::Done {
                    title: doc.title.clone(),
                });
            }
            Err(e) => {
                warn!("Ingestion failed: {}", e);
                self.enter(IngestState::Failed {
                    message: e.to_string(),
                    hint: e.hint(),
                });
            }
        }
        result
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Extract one page image to an HTML fragment.
///
/// `index` is the 0-based position of the page among `total`.
pub async fn extract_page_image(
    model: &dyn GenerativeModel,
    image: ImagePayload,
    index: usize,
    total: usize,
    config: &DraftConfig,
) -> Result<String, DraftError> {
    extract_chunk(model, vec![image], index, total, config).await
}

/// Synthesize page-ordered fragments into one document.
pub async fn synthesize_fragments(
    model: &dyn GenerativeModel,
    fragments: &[String],
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    synthesize(model, fragments, config).await
}

/// Single image end to end: one extraction, then synthesis of that one
/// fragment.
pub async fn process_single_image(
    model: &dyn GenerativeModel,
    image: ImagePayload,
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    let run = Run::start(config);
    let result = single_image_flow(&run, model, image, config).await;
    run.finish(result)
}

/// Run extraction over an already-chunked document, then synthesize.
pub async fn ingest_chunks(
    model: &dyn GenerativeModel,
    chunked: ChunkedDocument,
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    let run = Run::start(config);
    let result = chunked_flow(&run, model, chunked, config).await;
    run.finish(result)
}

/// Ingest a loaded source document.
///
/// PDFs take the chunked path; a single image short-circuits to
/// [`process_single_image`].
pub async fn ingest_source(
    model: &dyn GenerativeModel,
    source: SourceDocument,
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    info!(
        "Starting ingestion: {} ({} bytes)",
        source.name,
        source.bytes.len()
    );
    match source.kind {
        DocumentKind::Image { ref mime_type } => {
            let image = encode_bytes(&source.bytes, mime_type);
            process_single_image(model, image, config).await
        }
        DocumentKind::Pdf => {
            let run = Run::start(config);
            run.enter(IngestState::Chunking);
            let result = match chunk_pdf(source.name, source.bytes, config).await {
                Ok(chunked) => chunked_flow(&run, model, chunked, config).await,
                Err(e) => Err(e),
            };
            run.finish(result)
        }
    }
}

/// Resolve `input` (path or URL) and the configured model, then ingest.
pub async fn ingest(
    input: impl AsRef<str>,
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    let model = resolve_model(config)?;
    let source = resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    ingest_source(model.as_ref(), source, config).await
}

/// Ingest `input` and wrap the result as an imported template.
pub async fn import_template(
    input: impl AsRef<str>,
    config: &DraftConfig,
) -> Result<ContractTemplate, DraftError> {
    let doc = ingest(input, config).await?;
    Ok(ContractTemplate::from_import(doc))
}

/// Synchronous wrapper around [`import_template`].
///
/// Creates a temporary tokio runtime internally.
pub fn import_template_sync(
    input: impl AsRef<str>,
    config: &DraftConfig,
) -> Result<ContractTemplate, DraftError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DraftError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(import_template(input, config))
}

// ── Flow bodies ──────────────────────────────────────────────────────────

async fn single_image_flow(
    run: &Run<'_>,
    model: &dyn GenerativeModel,
    image: ImagePayload,
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    run.enter(IngestState::ExtractingSingle);
    let fragment = extract_chunk(model, vec![image], 0, 1, config).await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_chunk_complete(0, 1, fragment.len());
    }
    run.enter(IngestState::Synthesizing);
    synthesize(model, &[fragment], config).await
}

async fn chunked_flow(
    run: &Run<'_>,
    model: &dyn GenerativeModel,
    mut chunked: ChunkedDocument,
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    let total = chunked.total_chunks;
    info!(
        "{} page(s) in {} chunk(s) of up to {}",
        chunked.total_pages, total, config.pages_per_chunk
    );

    let mut fragments: Vec<String> = Vec::with_capacity(total);
    while let Some(next) = chunked.chunks.next().await {
        let chunk = next?;
        run.enter(IngestState::Extracting {
            chunk: chunk.index,
            total,
        });

        let fragment = extract_chunk(model, chunk.images, chunk.index, total, config).await?;
        if let Some(ref cb) = config.progress_callback {
            cb.on_chunk_complete(chunk.index, total, fragment.len());
        }
        fragments.push(fragment);

        if chunk.index + 1 < total {
            run.enter(IngestState::Pausing {
                chunk: chunk.index,
                total,
            });
            sleep(Duration::from_millis(config.chunk_pause_ms)).await;
        }
    }

    if fragments.len() != total {
        return Err(DraftError::Internal(format!(
            "chunk stream ended after {} of {} chunks",
            fragments.len(),
            total
        )));
    }

    run.enter(IngestState::Synthesizing);
    synthesize(model, &fragments, config).await
}
