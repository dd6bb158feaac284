//! Chunk extraction: page images → HTML fragment with placeholders.
//!
//! One request per chunk, in text mode: the reply is the HTML itself, not
//! JSON. Every page image of the chunk travels in that single request, in
//! page order.

use crate::config::DraftConfig;
use crate::error::{DraftError, ModelError};
use crate::model::{invoke, GenerativeModel, ImagePayload, ModelRequest};
use crate::pipeline::normalize::strip_fences;
use crate::pipeline::retry::{with_backoff, BackoffPolicy};
use crate::prompts;
use tracing::{debug, info};

/// Extract the content of one chunk as an HTML fragment.
///
/// `chunk_index` is 0-based. Rate-limited calls are retried per the
/// config's backoff policy; any other failure, or a reply that is empty
/// once fences are stripped, is an [`DraftError::Extraction`] carrying the
/// 1-based chunk number.
pub async fn extract_chunk(
    model: &dyn GenerativeModel,
    images: Vec<ImagePayload>,
    chunk_index: usize,
    total_chunks: usize,
    config: &DraftConfig,
) -> Result<String, DraftError> {
    let chunk = chunk_index + 1;
    let page_count = images.len();
    let prompt = prompts::extraction_prompt(chunk_index, total_chunks, page_count);
    let request = ModelRequest::text(config.extraction_model(), prompt, config).with_images(images);

    info!(
        "Extracting chunk {}/{} ({} page(s))",
        chunk,
        total_chunks.max(1),
        page_count
    );

    let policy = BackoffPolicy::from_config(config);
    let label = format!("extract chunk {}", chunk);
    let reply = with_backoff(&policy, &label, || invoke(model, &request, config))
        .await
        .map_err(|source| DraftError::Extraction { chunk, source })?;

    let html = strip_fences(&reply.text);
    if html.is_empty() {
        return Err(DraftError::Extraction {
            chunk,
            source: ModelError::EmptyResponse,
        });
    }

    debug!("Chunk {} → {} chars of HTML", chunk, html.len());
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelReply;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        replies: Mutex<Vec<Result<String, ModelError>>>,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Canned {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for Canned {
        async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            let next = self.replies.lock().unwrap().pop().expect("script exhausted");
            next.map(|text| ModelReply {
                text,
                ..Default::default()
            })
        }
    }

    fn page(n: u8) -> ImagePayload {
        ImagePayload::new(format!("page{n}"), "image/jpeg")
    }

    #[tokio::test]
    async fn sends_all_pages_in_one_request_and_strips_fences() {
        let model = Canned::new(vec![Ok("```html\n<p>xxxx_CLIENT_NAME</p>\n```".into())]);
        let config = DraftConfig::default();

        let html = extract_chunk(&model, vec![page(1), page(2), page(3)], 0, 3, &config)
            .await
            .unwrap();

        assert_eq!(html, "<p>xxxx_CLIENT_NAME</p>");
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].images, vec![page(1), page(2), page(3)]);
        assert!(seen[0].schema.is_none());
        assert!(seen[0].prompt.contains("part 1 of 3"));
    }

    #[tokio::test]
    async fn empty_reply_is_an_extraction_error() {
        let model = Canned::new(vec![Ok("```\n```".into())]);
        let err = extract_chunk(&model, vec![page(1)], 1, 2, &DraftConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DraftError::Extraction {
                chunk: 2,
                source: ModelError::EmptyResponse
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_retried_transport_is_not() {
        let model = Canned::new(vec![
            Err(ModelError::rate_limited("429")),
            Ok("<p>ok</p>".into()),
        ]);
        let html = extract_chunk(&model, vec![page(1)], 0, 1, &DraftConfig::default())
            .await
            .unwrap();
        assert_eq!(html, "<p>ok</p>");
        assert_eq!(model.seen.lock().unwrap().len(), 2);

        let model = Canned::new(vec![Err(ModelError::transport("reset"))]);
        let err = extract_chunk(&model, vec![page(1)], 0, 1, &DraftConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::Extraction { chunk: 1, .. }));
        assert_eq!(model.seen.lock().unwrap().len(), 1);
    }
}
