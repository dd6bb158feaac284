//! Guided template drafting in two phases.
//!
//! Phase one collects a fixed set of answers. The model turns them into
//! follow-up questions; phase two collects answers to those, keyed by
//! question index. A session is a tagged enum so a template can only be
//! generated from a complete second-phase session, and every session is
//! validated before any model call.
//!
//! Sessions serialise with a `phase` tag, which is how the CLI hands a
//! half-finished session back to the user for editing.

use crate::config::DraftConfig;
use crate::error::DraftError;
use crate::model::{invoke, GenerativeModel, ModelRequest, OutputSchema};
use crate::pipeline::normalize::{normalize_json, normalize_json_array};
use crate::pipeline::retry::{with_backoff, BackoffPolicy};
use crate::prompts;
use crate::template::{new_id, ContractTemplate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

/// Follow-up questions requested from the model.
pub const QUESTION_COUNT: usize = 5;

/// Answers to the fixed first-phase questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedAnswers {
    /// Document format, e.g. "Master Services Agreement".
    pub format: String,
    pub client_name: String,
    /// What the contract covers.
    pub object: String,
    pub purpose: String,
    /// Free-form strategic context; may be empty.
    #[serde(default)]
    pub context: String,
}

impl FixedAnswers {
    pub fn validate(&self) -> Result<(), DraftError> {
        let required = [
            ("format", &self.format),
            ("client_name", &self.client_name),
            ("object", &self.object),
            ("purpose", &self.purpose),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, v)| v.trim().is_empty())
            .map(|(k, _)| *k)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DraftError::InvalidWizard(format!(
                "missing answers: {}",
                missing.join(", ")
            )))
        }
    }
}

/// A wizard session in one of its two phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum WizardSession {
    /// Fixed answers collected, no questions yet.
    Fixed { answers: FixedAnswers },
    /// Follow-up questions issued; `responses` is keyed by question index.
    Dynamic {
        answers: FixedAnswers,
        questions: Vec<String>,
        #[serde(default, deserialize_with = "index_keys::deserialize")]
        responses: BTreeMap<usize, String>,
    },
}

/// JSON object keys are strings, and an internally tagged enum buffers its
/// content before the variant is known, so integer keys arrive as `"0"`.
mod index_keys {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use std::collections::BTreeMap;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<usize, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        BTreeMap::<String, String>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                k.trim().parse::<usize>().map(|i| (i, v)).map_err(|_| {
                    D::Error::custom(format!("response key '{}' is not a question index", k))
                })
            })
            .collect()
    }
}

impl WizardSession {
    pub fn start(answers: FixedAnswers) -> Result<Self, DraftError> {
        answers.validate()?;
        Ok(WizardSession::Fixed { answers })
    }

    pub fn answers(&self) -> &FixedAnswers {
        match self {
            WizardSession::Fixed { answers } | WizardSession::Dynamic { answers, .. } => answers,
        }
    }

    /// Move to phase two with the given questions.
    pub fn with_questions(self, questions: Vec<String>) -> Result<Self, DraftError> {
        match self {
            WizardSession::Fixed { answers } => {
                if questions.is_empty() {
                    return Err(DraftError::InvalidWizard("no follow-up questions".into()));
                }
                Ok(WizardSession::Dynamic {
                    answers,
                    questions,
                    responses: BTreeMap::new(),
                })
            }
            WizardSession::Dynamic { .. } => Err(DraftError::InvalidWizard(
                "questions were already generated".into(),
            )),
        }
    }

    /// Record the answer to question `index`.
    pub fn answer(&mut self, index: usize, text: impl Into<String>) -> Result<(), DraftError> {
        match self {
            WizardSession::Dynamic {
                questions,
                responses,
                ..
            } => {
                if index >= questions.len() {
                    return Err(DraftError::InvalidWizard(format!(
                        "question {} does not exist ({} questions)",
                        index,
                        questions.len()
                    )));
                }
                responses.insert(index, text.into());
                Ok(())
            }
            WizardSession::Fixed { .. } => Err(DraftError::InvalidWizard(
                "no follow-up questions to answer yet".into(),
            )),
        }
    }

    /// Check that the session can generate a template.
    pub fn validate_complete(&self) -> Result<(), DraftError> {
        self.answers().validate()?;
        match self {
            WizardSession::Fixed { .. } => Err(DraftError::InvalidWizard(
                "follow-up questions have not been answered".into(),
            )),
            WizardSession::Dynamic {
                questions,
                responses,
                ..
            } => {
                if let Some(bad) = responses.keys().find(|i| **i >= questions.len()) {
                    return Err(DraftError::InvalidWizard(format!(
                        "answer for unknown question {}",
                        bad
                    )));
                }
                Ok(())
            }
        }
    }

    /// Question/answer pairs rendered for the generation prompt.
    /// Unanswered questions are listed with an empty answer.
    fn details(&self) -> String {
        match self {
            WizardSession::Fixed { .. } => String::new(),
            WizardSession::Dynamic {
                questions,
                responses,
                ..
            } => questions
                .iter()
                .enumerate()
                .map(|(i, q)| {
                    let a = responses.get(&i).map(String::as_str).unwrap_or("");
                    format!("\n  - Q: {}\n    A: {}", q, a)
                })
                .collect(),
        }
    }
}

/// Ask the model for the phase-two questions.
pub async fn generate_questions(
    model: &dyn GenerativeModel,
    answers: &FixedAnswers,
    config: &DraftConfig,
) -> Result<Vec<String>, DraftError> {
    answers.validate()?;
    let prompt = prompts::questions_prompt(
        &answers.object,
        &answers.purpose,
        &answers.client_name,
        &answers.context,
        QUESTION_COUNT,
    );
    let request =
        ModelRequest::text(config.text_model(), prompt, config).with_schema(OutputSchema::StringArray);

    let policy = BackoffPolicy::from_config(config);
    let reply = with_backoff(&policy, "questions", || invoke(model, &request, config)).await?;

    let value = normalize_json_array(&reply.text)?;
    let questions: Vec<String> = value
        .as_array()
        .ok_or_else(|| DraftError::Generation {
            detail: "expected a JSON array of questions".into(),
        })?
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .take(QUESTION_COUNT)
        .map(String::from)
        .collect();

    if questions.is_empty() {
        return Err(DraftError::Generation {
            detail: "model returned no questions".into(),
        });
    }
    info!("Generated {} follow-up question(s)", questions.len());
    Ok(questions)
}

/// Generate a template from a completed phase-two session.
pub async fn generate_template(
    model: &dyn GenerativeModel,
    session: &WizardSession,
    config: &DraftConfig,
) -> Result<ContractTemplate, DraftError> {
    session.validate_complete()?;
    let answers = session.answers();
    let prompt = prompts::template_prompt(
        &answers.object,
        &answers.client_name,
        &answers.format,
        &session.details(),
    );
    let request = ModelRequest::text(config.text_model(), prompt, config)
        .with_schema(OutputSchema::object(&["title", "category", "html"]));

    let policy = BackoffPolicy::from_config(config);
    let reply = with_backoff(&policy, "template", || invoke(model, &request, config)).await?;

    let value = normalize_json(&reply.text)?;
    let field = |name: &str| -> Result<String, DraftError> {
        value
            .get(name)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DraftError::Generation {
                detail: format!("response has no usable '{}' field", name),
            })
    };
    let html = field("html")?;
    let title = field("title")?;
    let category = field("category")?;

    info!("Generated template '{}' ({} chars)", title, html.len());
    Ok(ContractTemplate::new(
        new_id("gen"),
        title,
        format!("AI-architected {} for {}.", answers.format, answers.client_name),
        category,
        html,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> FixedAnswers {
        FixedAnswers {
            format: "Service Agreement".into(),
            client_name: "Acme".into(),
            object: "Managed network".into(),
            purpose: "Renewal".into(),
            context: String::new(),
        }
    }

    #[test]
    fn missing_fixed_answers_are_reported() {
        let mut a = answers();
        a.client_name = " ".into();
        a.object.clear();
        let err = WizardSession::start(a).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("client_name"));
        assert!(msg.contains("object"));
    }

    #[test]
    fn phases_advance_in_order() {
        let mut session = WizardSession::start(answers()).unwrap();
        assert!(session.answer(0, "x").is_err());
        assert!(session.validate_complete().is_err());

        session = session.with_questions(vec!["Q1".into(), "Q2".into()]).unwrap();
        session.answer(1, "99.9%").unwrap();
        assert!(session.answer(2, "nope").is_err());
        session.validate_complete().unwrap();
        assert!(session.clone().with_questions(vec!["Q".into()]).is_err());

        let details = session.details();
        assert!(details.contains("Q: Q1\n    A: \n"));
        assert!(details.contains("Q: Q2\n    A: 99.9%"));
    }

    #[test]
    fn session_serialises_with_phase_tag() {
        let session = WizardSession::start(answers())
            .unwrap()
            .with_questions(vec!["Q1".into()])
            .unwrap();
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["phase"], "dynamic");
        let back: WizardSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn answered_session_reads_back_from_json() {
        let mut session = WizardSession::start(answers())
            .unwrap()
            .with_questions(vec!["Q1".into(), "Q2".into()])
            .unwrap();
        session.answer(0, "Quarterly").unwrap();
        session.answer(1, "Net 30").unwrap();

        let text = serde_json::to_string_pretty(&session).unwrap();
        assert!(text.contains("\"0\": \"Quarterly\""));
        let back: WizardSession = serde_json::from_str(&text).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn hand_written_responses_are_keyed_by_index() {
        let text = r#"{
            "phase": "dynamic",
            "answers": {"format": "NDA", "client_name": "Acme", "object": "Data", "purpose": "Pilot"},
            "questions": ["Term?"],
            "responses": {"0": "Two years"}
        }"#;
        let session: WizardSession = serde_json::from_str(text).unwrap();
        session.validate_complete().unwrap();
        assert!(session.details().contains("A: Two years"));

        let bad = text.replace("\"0\"", "\"first\"");
        let err = serde_json::from_str::<WizardSession>(&bad).unwrap_err();
        assert!(err.to_string().contains("not a question index"));
    }
}
