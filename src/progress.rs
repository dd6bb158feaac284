//! Observer trait for ingestion runs.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::DraftConfigBuilder::progress_callback`] to follow an
//! ingestion run through its states (see [`crate::ingest::IngestState`]).
//!
//! # Example
//!
//! ```rust
//! use edgequake_drafter::{DraftConfig, IngestProgressCallback, IngestState};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl IngestProgressCallback for Printer {
//!     fn on_state(&self, state: &IngestState) {
//!         eprintln!("ingest: {state}");
//!     }
//! }
//!
//! let config = DraftConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::ingest::IngestState;
use std::sync::Arc;

/// Called by the orchestration flow on every state transition.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Chunks are processed strictly sequentially, so calls
/// never overlap within one run.
pub trait IngestProgressCallback: Send + Sync {
    /// Every transition, terminal states included.
    fn on_state(&self, state: &IngestState) {
        let _ = state;
    }

    /// A chunk finished extracting.
    ///
    /// # Arguments
    /// * `chunk`        — 0-based chunk index
    /// * `total_chunks` — chunks in this run
    /// * `html_len`     — byte length of the extracted fragment
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, html_len: usize) {
        let _ = (chunk, total_chunks, html_len);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DraftConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        states: AtomicUsize,
        chunks: AtomicUsize,
    }

    impl IngestProgressCallback for Counting {
        fn on_state(&self, _state: &IngestState) {
            self.states.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_complete(&self, _chunk: usize, _total: usize, _len: usize) {
            self.chunks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_state(&IngestState::Idle);
        cb.on_chunk_complete(0, 1, 42);
    }

    #[test]
    fn arc_dyn_callback_receives_events() {
        let counting = Arc::new(Counting {
            states: AtomicUsize::new(0),
            chunks: AtomicUsize::new(0),
        });
        let cb: ProgressCallback = counting.clone();
        cb.on_state(&IngestState::Chunking);
        cb.on_state(&IngestState::Extracting { chunk: 0, total: 2 });
        cb.on_chunk_complete(0, 2, 10);
        assert_eq!(counting.states.load(Ordering::SeqCst), 2);
        assert_eq!(counting.chunks.load(Ordering::SeqCst), 1);
    }
}
