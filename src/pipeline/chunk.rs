//! Document chunking: group pages into fixed-size batches, rasterise and
//! encode each batch, and hand the batches over in page order.
//!
//! ## Why a channel and a blocking thread?
//!
//! Page rendering is CPU-bound, so it runs under `spawn_blocking`. A pdfium
//! document cannot leave the thread that opened it, so PDFs are driven on
//! one dedicated blocking thread for the whole run ([`run_chunker`]);
//! `Send` sources render one chunk per blocking task ([`chunk_pages`]).
//! Either way chunks cross back over a bounded channel of capacity one: at
//! most one chunk is rendered ahead of the extractor, and production stops
//! as soon as the consumer drops the stream. The stream is finite, ordered
//! and cannot be restarted.
//!
//! The page count is reported before the first chunk so the orchestration
//! flow knows the batch total up front.

use crate::error::DraftError;
use crate::model::ImagePayload;
use crate::pipeline::encode;
use futures::Stream;
use image::DynamicImage;
use std::ops::Range;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Pages per extraction request used by the import flow.
pub const DEFAULT_PAGES_PER_CHUNK: usize = 3;

/// A paginated source that can rasterise its pages one at a time.
///
/// Implementations run on a blocking thread and may hold non-`Send` state
/// when driven through [`run_chunker`] inside that thread.
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Render page `index` (0-based).
    fn render_page(&mut self, index: usize) -> Result<DynamicImage, DraftError>;
}

/// One batch of consecutive pages, ready for extraction.
#[derive(Debug, Clone)]
pub struct PageChunk {
    /// 0-based position of this chunk in the document.
    pub index: usize,
    /// Total chunks in the document.
    pub total: usize,
    /// 0-based page indices covered, ascending.
    pub pages: Range<usize>,
    /// One payload per page, in page order.
    pub images: Vec<ImagePayload>,
}

impl PageChunk {
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// Ordered stream of chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<PageChunk, DraftError>> + Send>>;

/// A document whose page count is known and whose chunks are pending.
pub struct ChunkedDocument {
    pub total_pages: usize,
    pub total_chunks: usize,
    pub chunks: ChunkStream,
}

impl std::fmt::Debug for ChunkedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedDocument")
            .field("total_pages", &self.total_pages)
            .field("total_chunks", &self.total_chunks)
            .finish_non_exhaustive()
    }
}

/// Split `total_pages` into consecutive ranges of at most `per_chunk` pages.
pub fn batch_ranges(total_pages: usize, per_chunk: usize) -> Vec<Range<usize>> {
    let per_chunk = per_chunk.max(1);
    (0..total_pages)
        .step_by(per_chunk)
        .map(|start| start..(start + per_chunk).min(total_pages))
        .collect()
}

/// Chunk a `Send` page source.
///
/// Each chunk renders in its own blocking task; the source moves into the
/// task and back out, so no blocking thread is held between chunks.
pub async fn chunk_pages<S>(
    name: impl Into<String>,
    source: S,
    per_chunk: usize,
    jpeg_quality: u8,
) -> Result<ChunkedDocument, DraftError>
where
    S: PageSource + Send + 'static,
{
    let name = name.into();
    let total_pages = source.page_count();
    if total_pages == 0 {
        return Err(DraftError::EmptyDocument { name });
    }
    let ranges = batch_ranges(total_pages, per_chunk);
    let total = ranges.len();
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut source = source;
        for (index, pages) in ranges.into_iter().enumerate() {
            let range = pages.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let rendered = render_chunk(&mut source, range, jpeg_quality);
                (source, rendered)
            })
            .await;
            let (back, rendered) = match joined {
                Ok(v) => v,
                Err(e) => {
                    let _ = tx
                        .send(Err(DraftError::Internal(format!("render task failed: {e}"))))
                        .await;
                    return;
                }
            };
            source = back;

            let chunk = rendered.map(|images| PageChunk {
                index,
                total,
                pages,
                images,
            });
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() {
                debug!("{}: chunk consumer dropped after chunk {}", name, index);
                return;
            }
            if failed {
                return;
            }
        }
    });

    Ok(ChunkedDocument {
        total_pages,
        total_chunks: total,
        chunks: Box::pin(ReceiverStream::new(rx)),
    })
}

/// Start `drive` on a blocking thread and wait for the page count.
///
/// `drive` must call [`run_chunker`] (directly or after opening a source
/// that only lives on that thread) or report an error on `ready`.
pub(crate) async fn spawn_chunker<D>(drive: D) -> Result<ChunkedDocument, DraftError>
where
    D: FnOnce(ReadySender, ChunkSender) + Send + 'static,
{
    let (ready_tx, ready_rx) = oneshot::channel();
    let (tx, rx) = mpsc::channel(1);

    tokio::task::spawn_blocking(move || drive(ready_tx, tx));

    let (total_pages, total_chunks) = ready_rx
        .await
        .map_err(|_| DraftError::Internal("chunker thread exited before reporting".into()))??;

    Ok(ChunkedDocument {
        total_pages,
        total_chunks,
        chunks: Box::pin(ReceiverStream::new(rx)),
    })
}

pub(crate) type ReadySender = oneshot::Sender<Result<(usize, usize), DraftError>>;
pub(crate) type ChunkSender = mpsc::Sender<Result<PageChunk, DraftError>>;

/// Drive `source` to completion on the current (blocking) thread.
///
/// Sends `(total_pages, total_chunks)` on `ready`, then every chunk in
/// order. Stops after the first failed chunk or when the receiver is gone.
pub(crate) fn run_chunker<S: PageSource + ?Sized>(
    name: &str,
    source: &mut S,
    per_chunk: usize,
    jpeg_quality: u8,
    ready: ReadySender,
    tx: ChunkSender,
) {
    let total_pages = source.page_count();
    if total_pages == 0 {
        let _ = ready.send(Err(DraftError::EmptyDocument {
            name: name.to_string(),
        }));
        return;
    }

    let ranges = batch_ranges(total_pages, per_chunk);
    let total = ranges.len();
    if ready.send(Ok((total_pages, total))).is_err() {
        return;
    }

    for (index, pages) in ranges.into_iter().enumerate() {
        let chunk = render_chunk(source, pages.clone(), jpeg_quality).map(|images| PageChunk {
            index,
            total,
            pages,
            images,
        });
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() {
            debug!("{}: chunk consumer dropped after chunk {}", name, index);
            return;
        }
        if failed {
            return;
        }
    }
}

fn render_chunk<S: PageSource + ?Sized>(
    source: &mut S,
    pages: Range<usize>,
    jpeg_quality: u8,
) -> Result<Vec<ImagePayload>, DraftError> {
    let mut images = Vec::with_capacity(pages.len());
    for idx in pages {
        let img = source.render_page(idx)?;
        let payload =
            encode::encode_page(&img, jpeg_quality).map_err(|e| DraftError::RasterisationFailed {
                page: idx + 1,
                detail: format!("Image encoding failed: {}", e),
            })?;
        images.push(payload);
    }
    Ok(images)
}
