//! Error types for the edgequake-drafter library.
//!
//! Two layers mirror the two places a failure can originate:
//!
//! * [`ModelError`] — raised by a [`crate::model::GenerativeModel`] for a
//!   single request. It is classified once, at the adapter boundary, into
//!   rate-limit / transport / empty-response so nothing downstream has to
//!   inspect message text.
//!
//! * [`DraftError`] — everything the public API returns: bad inputs,
//!   configuration problems, malformed generations, and model failures
//!   wrapped with the pipeline step that triggered them.
//!
//! [`DraftError::hint`] condenses any error into a [`FailureHint`] so a UI
//! can tell the user whether to simply retry or to try a smaller input.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of one request against the generative model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Upstream quota exhausted (HTTP 429 / `RESOURCE_EXHAUSTED`).
    ///
    /// The only variant the backoff executor retries.
    #[error("rate limit exceeded{}: {detail}", status_suffix(.status))]
    RateLimited { status: Option<u16>, detail: String },

    /// Network failure, non-429 HTTP error, auth failure, timeout.
    #[error("transport error{}: {detail}", status_suffix(.status))]
    Transport { status: Option<u16>, detail: String },

    /// The call succeeded but carried no text.
    #[error("model returned an empty response")]
    EmptyResponse,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ModelError {
    pub fn rate_limited(detail: impl Into<String>) -> Self {
        ModelError::RateLimited {
            status: Some(429),
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        ModelError::Transport {
            status: None,
            detail: detail.into(),
        }
    }
}

/// Errors whose rate-limit nature can be checked without string matching.
///
/// Implemented by every error type that flows through
/// [`crate::pipeline::retry::with_backoff`].
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

impl RateLimitSignal for ModelError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, ModelError::RateLimited { .. })
    }
}

/// All errors returned by the edgequake-drafter library.
#[derive(Debug, Error)]
pub enum DraftError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Bytes are neither a PDF nor a supported image format.
    #[error("Unsupported document '{name}': expected a PDF or an image\nFirst bytes: {magic:?}")]
    UnsupportedDocument { name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// The document has no pages to process.
    #[error("Document '{name}' contains no pages")]
    EmptyDocument { name: String },

    /// Rendering or encoding a page image failed.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the\n\
binary, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A model call failed outside of any more specific step.
    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),

    /// The model reply could not be coerced into the expected JSON shape.
    #[error("Malformed response from model: {detail}")]
    MalformedResponse { detail: String },

    /// Extracting one chunk of pages failed; the whole ingestion run is void.
    #[error("Extraction failed for chunk {chunk}: {source}")]
    Extraction {
        chunk: usize,
        #[source]
        source: ModelError,
    },

    /// The synthesis step failed or returned an incomplete document.
    #[error("Synthesis failed: {detail}")]
    Synthesis { detail: String },

    /// A scoped edit failed; the caller's document is untouched.
    #[error("Edit failed: {source}")]
    Edit {
        #[source]
        source: ModelError,
    },

    /// Wizard question or template generation failed.
    #[error("Generation failed: {detail}")]
    Generation { detail: String },

    /// Edit instructions must contain non-whitespace text.
    #[error("Edit instruction must not be empty")]
    EmptyInstruction,

    /// The wizard session is in the wrong phase or has missing answers.
    #[error("Invalid wizard session: {0}")]
    InvalidWizard(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RateLimitSignal for DraftError {
    fn is_rate_limited(&self) -> bool {
        match self {
            DraftError::Model(e) => e.is_rate_limited(),
            DraftError::Extraction { source, .. } | DraftError::Edit { source } => {
                source.is_rate_limited()
            }
            _ => false,
        }
    }
}

/// What a user can do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureHint {
    /// Transient: quota, network. Running the same request again may work.
    TryAgain,
    /// The model produced something unusable, often a truncated generation.
    SimplifyInput,
    /// The input or configuration itself is wrong.
    FixInput,
}

impl FailureHint {
    pub fn message(self) -> &'static str {
        match self {
            FailureHint::TryAgain => "Temporary failure talking to the model. Please try again.",
            FailureHint::SimplifyInput => {
                "The model response was incomplete. Try a smaller or simpler input."
            }
            FailureHint::FixInput => "Check the input document and configuration.",
        }
    }
}

fn model_hint(e: &ModelError) -> FailureHint {
    match e {
        ModelError::RateLimited { .. } | ModelError::Transport { .. } => FailureHint::TryAgain,
        ModelError::EmptyResponse => FailureHint::SimplifyInput,
    }
}

impl DraftError {
    /// Classify this error for user-facing messaging.
    pub fn hint(&self) -> FailureHint {
        match self {
            DraftError::Model(e) => model_hint(e),
            DraftError::Extraction { source, .. } | DraftError::Edit { source } => {
                model_hint(source)
            }
            DraftError::DownloadFailed { .. } | DraftError::DownloadTimeout { .. } => {
                FailureHint::TryAgain
            }
            DraftError::MalformedResponse { .. }
            | DraftError::Synthesis { .. }
            | DraftError::Generation { .. } => FailureHint::SimplifyInput,
            _ => FailureHint::FixInput,
        }
    }
}
