//! Scoped editing of a whole document.
//!
//! The reply is the entire updated document, never a diff. The input is only
//! borrowed, so a failed edit cannot touch the caller's copy; replace it with
//! the returned string on success.

use crate::config::DraftConfig;
use crate::error::{DraftError, ModelError};
use crate::model::{invoke, GenerativeModel, ModelRequest};
use crate::pipeline::compact::compact_html;
use crate::pipeline::normalize::strip_fences;
use crate::pipeline::retry::{with_backoff, BackoffPolicy};
use crate::prompts;
use crate::template::ContractTemplate;
use tracing::info;

/// Apply `instruction` to `html`, limited to `selection` when given.
///
/// A blank selection counts as no selection.
pub async fn edit_document(
    model: &dyn GenerativeModel,
    html: &str,
    instruction: &str,
    selection: Option<&str>,
    config: &DraftConfig,
) -> Result<String, DraftError> {
    let instruction = instruction.trim();
    if instruction.is_empty() {
        return Err(DraftError::EmptyInstruction);
    }
    let selection = selection.filter(|s| !s.trim().is_empty());

    let compacted = compact_html(html);
    let prompt = prompts::edit_prompt(&compacted, instruction, selection);
    let request = ModelRequest::text(config.text_model(), prompt, config);

    info!(
        "Editing document ({} → {} chars compacted, scoped: {})",
        html.len(),
        compacted.len(),
        selection.is_some()
    );

    let policy = BackoffPolicy::from_config(config);
    let reply = with_backoff(&policy, "edit", || invoke(model, &request, config))
        .await
        .map_err(|source| DraftError::Edit { source })?;

    let updated = strip_fences(&reply.text);
    if updated.is_empty() {
        return Err(DraftError::Edit {
            source: ModelError::EmptyResponse,
        });
    }
    Ok(updated)
}

/// Edit a template in place. On failure the template is unchanged.
pub async fn edit_template(
    model: &dyn GenerativeModel,
    template: &mut ContractTemplate,
    instruction: &str,
    selection: Option<&str>,
    config: &DraftConfig,
) -> Result<(), DraftError> {
    let updated = edit_document(model, template.content(), instruction, selection, config).await?;
    template.apply_edit(updated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelReply;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        reply: Result<String, ModelError>,
        prompts: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new(reply: Result<String, ModelError>) -> Self {
            Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for Echo {
        async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            self.reply.clone().map(|text| ModelReply {
                text,
                ..Default::default()
            })
        }
    }

    #[test]
    fn blank_selection_means_whole_document() {
        let model = Echo::new(Ok("<p>new</p>".into()));
        let updated = tokio_test::block_on(edit_document(
            &model,
            "<p>old</p>",
            "  make it new ",
            Some("   "),
            &DraftConfig::default(),
        ))
        .unwrap();

        assert_eq!(updated, "<p>new</p>");
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("make it new"));
        assert!(!prompts[0].contains("Only change this specific text"));
    }

    #[test]
    fn fenced_reply_is_unwrapped() {
        let model = Echo::new(Ok("```html\n<h1>xxxx_TITLE</h1>\n```".into()));
        let mut template = ContractTemplate::new("t", "T", "", "Legal", "<h1>Old</h1>");

        tokio_test::block_on(edit_template(
            &model,
            &mut template,
            "use a placeholder",
            None,
            &DraftConfig::default(),
        ))
        .unwrap();

        assert_eq!(template.content(), "<h1>xxxx_TITLE</h1>");
        assert_eq!(template.placeholders(), ["xxxx_TITLE".to_string()]);
    }

    #[test]
    fn empty_reply_keeps_template() {
        let model = Echo::new(Ok("  ".into()));
        let mut template = ContractTemplate::new("t", "T", "", "Legal", "<p>xxxx_A</p>");

        let err = tokio_test::block_on(edit_template(
            &model,
            &mut template,
            "rewrite",
            None,
            &DraftConfig::default(),
        ))
        .unwrap_err();

        assert!(matches!(
            err,
            DraftError::Edit {
                source: ModelError::EmptyResponse
            }
        ));
        assert_eq!(template.content(), "<p>xxxx_A</p>");
    }
}
