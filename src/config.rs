//! Configuration for drafting, importing and editing contract templates.
//!
//! Every knob lives in [`DraftConfig`], built via [`DraftConfigBuilder`].
//! The config carries the model identity and credentials source explicitly,
//! so each pipeline component is a plain function of `(model, config, input)`
//! with no process-wide client hidden behind it.

use crate::error::DraftError;
use crate::model::GenerativeModel;
use crate::pipeline::chunk::DEFAULT_PAGES_PER_CHUNK;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default model for text and structured generations.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration shared by every pipeline component.
///
/// # Example
/// ```rust
/// use edgequake_drafter::DraftConfig;
///
/// let config = DraftConfig::builder()
///     .model("gemini-2.5-flash")
///     .pages_per_chunk(3)
///     .max_attempts(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DraftConfig {
    /// Model used for synthesis, editing and wizard generations.
    /// If None, [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// Model used for page extraction. If None, falls back to `model`.
    pub vision_model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    /// If None along with `provider`, resolved from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed model. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn GenerativeModel>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens generated per call. Default: 8192.
    ///
    /// Synthesis returns the whole contract inside a JSON string; a low cap
    /// truncates it mid-string and the reply becomes unparseable.
    pub max_tokens: usize,

    /// Attempts per model call, first try included. Default: 3.
    pub max_attempts: u32,

    /// Base of the exponential backoff, in milliseconds. Default: 2000.
    ///
    /// The wait before retry `n` (0-based) is `2^n * backoff_base_ms` plus
    /// a uniform jitter in `[0, backoff_jitter_ms)`.
    pub backoff_base_ms: u64,

    /// Upper bound (exclusive) of the random jitter. Default: 1000.
    pub backoff_jitter_ms: u64,

    /// Pages grouped into one extraction request. Default: 3.
    pub pages_per_chunk: usize,

    /// Render scale relative to the PDF's 72-dpi user space. Default: 1.5.
    pub render_scale: f32,

    /// Cap on the longest rendered edge in pixels. Default: 2400.
    pub max_rendered_pixels: u32,

    /// JPEG quality for page payloads (1–100). Default: 80.
    pub jpeg_quality: u8,

    /// Cooperative pause between chunk extractions, in ms. Default: 1500.
    pub chunk_pause_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Wall-clock limit per model call. Default: None (transport decides).
    pub request_timeout_secs: Option<u64>,

    /// Observer for ingestion state transitions.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            model: None,
            vision_model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 8192,
            max_attempts: 3,
            backoff_base_ms: 2000,
            backoff_jitter_ms: 1000,
            pages_per_chunk: DEFAULT_PAGES_PER_CHUNK,
            render_scale: 1.5,
            max_rendered_pixels: 2400,
            jpeg_quality: 80,
            chunk_pause_ms: 1500,
            password: None,
            download_timeout_secs: 120,
            request_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DraftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DraftConfig")
            .field("model", &self.model)
            .field("vision_model", &self.vision_model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn GenerativeModel>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("pages_per_chunk", &self.pages_per_chunk)
            .field("render_scale", &self.render_scale)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("chunk_pause_ms", &self.chunk_pause_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl DraftConfig {
    /// Create a new builder for `DraftConfig`.
    pub fn builder() -> DraftConfigBuilder {
        DraftConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model identifier for text and structured calls.
    pub fn text_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Model identifier for page extraction calls.
    pub fn extraction_model(&self) -> &str {
        self.vision_model
            .as_deref()
            .unwrap_or_else(|| self.text_model())
    }
}

/// Builder for [`DraftConfig`].
pub struct DraftConfigBuilder {
    config: DraftConfig,
}

impl DraftConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn GenerativeModel>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn backoff_base_ms(mut self, ms: u64) -> Self {
        self.config.backoff_base_ms = ms;
        self
    }

    pub fn backoff_jitter_ms(mut self, ms: u64) -> Self {
        self.config.backoff_jitter_ms = ms;
        self
    }

    pub fn pages_per_chunk(mut self, n: usize) -> Self {
        self.config.pages_per_chunk = n;
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn chunk_pause_ms(mut self, ms: u64) -> Self {
        self.config.chunk_pause_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DraftConfig, DraftError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(DraftError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.pages_per_chunk == 0 {
            return Err(DraftError::InvalidConfig(
                "pages_per_chunk must be ≥ 1".into(),
            ));
        }
        if !(0.25..=4.0).contains(&c.render_scale) {
            return Err(DraftError::InvalidConfig(format!(
                "render_scale must be 0.25–4.0, got {}",
                c.render_scale
            )));
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(DraftError::InvalidConfig(format!(
                "jpeg_quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.request_timeout_secs == Some(0) {
            return Err(DraftError::InvalidConfig(
                "request_timeout_secs must be ≥ 1 when set".into(),
            ));
        }
        Ok(self.config)
    }
}
