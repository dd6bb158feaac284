//! The generative-model seam.
//!
//! Pipeline components never talk to a provider SDK directly. They build a
//! [`ModelRequest`] and hand it to a [`GenerativeModel`], which returns the
//! reply text or a classified [`ModelError`]. Two consequences:
//!
//! 1. **Structured failure signals.** Provider errors are classified exactly
//!    once, in [`EdgequakeModel`], into rate-limit / transport / empty. The
//!    retry executor only ever checks [`ModelError::is_rate_limited`].
//! 2. **Test doubles.** Tests implement the trait with a scripted model and
//!    assert on the requests it saw.
//!
//! [`resolve_model`] turns a [`DraftConfig`] into a ready model, from most
//! specific (a pre-built model) to least specific (environment detection).

use crate::config::DraftConfig;
use crate::error::{DraftError, ModelError};
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// A base64 image attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Base64 (standard alphabet, padded) of the compressed image bytes.
    pub data: String,
    /// e.g. `image/jpeg`.
    pub mime_type: String,
}

impl ImagePayload {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Required shape of a structured reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSchema {
    /// An object whose listed fields are all required strings.
    Object { required: Vec<&'static str> },
    /// A JSON array of strings.
    StringArray,
}

impl OutputSchema {
    pub fn object(required: &[&'static str]) -> Self {
        OutputSchema::Object {
            required: required.to_vec(),
        }
    }

    /// JSON Schema rendering sent alongside the prompt.
    pub fn to_json_schema(&self) -> Value {
        match self {
            OutputSchema::Object { required } => {
                let properties: serde_json::Map<String, Value> = required
                    .iter()
                    .map(|name| (name.to_string(), json!({ "type": "string" })))
                    .collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
            OutputSchema::StringArray => json!({
                "type": "array",
                "items": { "type": "string" },
            }),
        }
    }
}

/// One call to the model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Model identifier, e.g. `gemini-2.5-flash`.
    pub model: String,
    pub prompt: String,
    /// Page images, in page order. Empty for text-only calls.
    pub images: Vec<ImagePayload>,
    /// `Some` for structured mode, `None` for free text.
    pub schema: Option<OutputSchema>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ModelRequest {
    /// A text-mode request using the config's sampling settings.
    pub fn text(model: &str, prompt: impl Into<String>, config: &DraftConfig) -> Self {
        Self {
            model: model.to_string(),
            prompt: prompt.into(),
            images: Vec::new(),
            schema: None,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn with_images(mut self, images: Vec<ImagePayload>) -> Self {
        self.images = images;
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// A successful reply.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A text/vision completion service.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, ModelError>;
}

/// Issue one request, bounded by `config.request_timeout_secs` when set.
///
/// An elapsed timeout is a transport failure and is therefore not retried.
pub async fn invoke(
    model: &dyn GenerativeModel,
    request: &ModelRequest,
    config: &DraftConfig,
) -> Result<ModelReply, ModelError> {
    let start = Instant::now();
    let reply = match config.request_timeout_secs {
        Some(secs) => timeout(Duration::from_secs(secs), model.generate(request))
            .await
            .map_err(|_| ModelError::transport(format!("request timed out after {secs}s")))??,
        None => model.generate(request).await?,
    };
    debug!(
        "{}: {} input tokens, {} output tokens, {:?}",
        request.model,
        reply.input_tokens,
        reply.output_tokens,
        start.elapsed()
    );
    Ok(reply)
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`GenerativeModel`] backed by an `edgequake_llm` provider.
///
/// Requests naming a model other than the provider's default are served by
/// a sibling provider created on first use and cached per model id.
pub struct EdgequakeModel {
    provider_name: Option<String>,
    default_model: String,
    default: Arc<dyn LLMProvider>,
    siblings: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl EdgequakeModel {
    pub fn new(
        provider_name: Option<String>,
        default_model: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        Self {
            provider_name,
            default_model: default_model.into(),
            default: provider,
            siblings: Mutex::new(HashMap::new()),
        }
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, ModelError> {
        let Some(ref name) = self.provider_name else {
            return Ok(Arc::clone(&self.default));
        };
        if model == self.default_model {
            return Ok(Arc::clone(&self.default));
        }
        let mut siblings = self
            .siblings
            .lock()
            .map_err(|_| ModelError::transport("provider cache poisoned"))?;
        if let Some(p) = siblings.get(model) {
            return Ok(Arc::clone(p));
        }
        let provider = ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| ModelError::transport(format!("cannot create provider for {model}: {e}")))?;
        siblings.insert(model.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}

#[async_trait]
impl GenerativeModel for EdgequakeModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let provider = self.provider_for(&request.model)?;

        let mut messages = Vec::with_capacity(2);
        if let Some(ref schema) = request.schema {
            messages.push(ChatMessage::system(schema_instruction(schema)));
        }
        if request.images.is_empty() {
            messages.push(ChatMessage::user(request.prompt.clone()));
        } else {
            let images = request
                .images
                .iter()
                .map(|img| ImageData::new(img.data.clone(), img.mime_type.clone()).with_detail("high"))
                .collect();
            messages.push(ChatMessage::user_with_images(request.prompt.clone(), images));
        }

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(classify_provider_error)?;

        if response.content.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        Ok(ModelReply {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

fn schema_instruction(schema: &OutputSchema) -> String {
    format!(
        "Respond with a single JSON value and nothing else. It must conform to this JSON Schema:\n{}",
        schema.to_json_schema()
    )
}

/// Status slot of a provider `ApiError`, e.g. `Gemini API error (429): …`.
static RE_API_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{3})\b[^)]*\)").unwrap());

/// Map a provider error onto the crate's taxonomy.
///
/// Providers that know the HTTP status report `RateLimited` directly.
/// Gemini reports every non-2xx reply as `ApiError` with the status in
/// parentheses, so that slot is read and only a 429 counts as a rate limit.
pub(crate) fn classify_provider_error(err: LlmError) -> ModelError {
    match err {
        LlmError::RateLimited(detail) => ModelError::RateLimited {
            status: Some(429),
            detail,
        },
        LlmError::ApiError(detail) => {
            let status = RE_API_STATUS
                .captures(&detail)
                .and_then(|c| c[1].parse::<u16>().ok());
            if status == Some(429) {
                ModelError::RateLimited { status, detail }
            } else {
                ModelError::Transport { status, detail }
            }
        }
        other => ModelError::Transport {
            status: None,
            detail: other.to_string(),
        },
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the model to use, from most-specific to least-specific:
///
/// 1. **Pre-built model** (`config.provider`) — used as-is; this is how tests
///    inject doubles.
/// 2. **Named provider** (`config.provider_name`) + `config.text_model()`.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **`GEMINI_API_KEY`** present → the gemini provider.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
///
/// A missing credential is a configuration failure: the error is
/// [`DraftError::ProviderNotConfigured`] and no pipeline step runs.
pub fn resolve_model(config: &DraftConfig) -> Result<Arc<dyn GenerativeModel>, DraftError> {
    if let Some(ref model) = config.provider {
        return Ok(Arc::clone(model));
    }

    if let Some(ref name) = config.provider_name {
        return named_model(name, config.text_model());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return named_model(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            return named_model("gemini", config.text_model());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DraftError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(EdgequakeModel::new(
        None,
        config.text_model(),
        llm_provider,
    )))
}

fn named_model(provider_name: &str, model: &str) -> Result<Arc<dyn GenerativeModel>, DraftError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DraftError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(EdgequakeModel::new(
        Some(provider_name.to_string()),
        model,
        provider,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RateLimitSignal;

    #[test]
    fn typed_rate_limit_is_retryable() {
        let e = classify_provider_error(LlmError::RateLimited("slow down".into()));
        assert_eq!(
            e,
            ModelError::RateLimited {
                status: Some(429),
                detail: "slow down".into(),
            }
        );
    }

    #[test]
    fn gemini_status_slot_is_read() {
        let e = classify_provider_error(LlmError::ApiError(
            "Gemini API error (429): Resource has been exhausted (e.g. check quota).".into(),
        ));
        assert!(matches!(e, ModelError::RateLimited { status: Some(429), .. }));

        let e = classify_provider_error(LlmError::ApiError(
            "Gemini API error (503 Service Unavailable): overloaded".into(),
        ));
        assert!(matches!(e, ModelError::Transport { status: Some(503), .. }));
    }

    #[test]
    fn quota_words_outside_a_rate_limit_are_not_retried() {
        let auth = classify_provider_error(LlmError::AuthError(
            "API key not valid for quota project 429".into(),
        ));
        assert!(matches!(auth, ModelError::Transport { status: None, .. }));
        assert!(!auth.is_rate_limited());

        let net = classify_provider_error(LlmError::NetworkError(
            "connection reset after 429 bytes".into(),
        ));
        assert!(!net.is_rate_limited());

        let api = classify_provider_error(LlmError::ApiError("rate limit wording, no status".into()));
        assert!(matches!(api, ModelError::Transport { status: None, .. }));
    }

    #[test]
    fn timeout_is_transport() {
        let e = classify_provider_error(LlmError::Timeout);
        assert_eq!(
            e,
            ModelError::Transport {
                status: None,
                detail: "Request timed out".into(),
            }
        );
    }

    #[test]
    fn object_schema_lists_required_fields() {
        let schema = OutputSchema::object(&["title", "html"]).to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["title", "html"]));
        assert_eq!(schema["properties"]["html"]["type"], "string");
    }

    #[test]
    fn array_schema_is_strings() {
        let schema = OutputSchema::StringArray.to_json_schema();
        assert_eq!(schema["items"]["type"], "string");
    }

    #[test]
    fn text_request_copies_sampling_settings() {
        let config = DraftConfig::builder()
            .temperature(0.5)
            .max_tokens(100)
            .build()
            .unwrap();
        let req = ModelRequest::text("m", "hello", &config).with_schema(OutputSchema::StringArray);
        assert_eq!(req.model, "m");
        assert_eq!(req.max_tokens, 100);
        assert!(req.images.is_empty());
        assert_eq!(req.schema, Some(OutputSchema::StringArray));
    }
}
