//! Synthesis: ordered HTML fragments → one `{title, html}` document.
//!
//! Fragments must arrive in page order. Before the request is built, a
//! deterministic pass removes the most common cross-chunk duplication: a
//! running header or footer line repeated verbatim at the edge of every
//! fragment. The first fragment is canonical and is never trimmed. Anything
//! subtler is left to the model, which is also told to de-duplicate.
//!
//! The structured reply goes through the tolerant normaliser; a reply
//! without a usable `html` field is rejected rather than turned into an
//! empty document.

use crate::config::DraftConfig;
use crate::error::DraftError;
use crate::model::{invoke, GenerativeModel, ModelRequest, OutputSchema};
use crate::pipeline::normalize::normalize_json;
use crate::pipeline::retry::{with_backoff, BackoffPolicy};
use crate::prompts;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// The merged document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedDocument {
    /// May be empty if the model had nothing to offer; callers choose a fallback.
    pub title: String,
    pub html: String,
}

/// Drop header/footer lines of fragments `1..` that repeat fragment 0's.
///
/// The header is the first line carrying visible text, the footer the last.
/// A line only qualifies when its tags open and close on that same line, so
/// wrapper lines such as `<div>` are skipped over and removing a match never
/// unbalances the markup. Fragment order is preserved and a fragment always
/// keeps some text.
pub fn trim_repeated_edges(fragments: &[String]) -> Vec<String> {
    let Some(first) = fragments.first() else {
        return Vec::new();
    };
    let first_lines: Vec<&str> = first.lines().collect();
    let header = edge_line(&first_lines, Edge::Top).map(|i| first_lines[i].trim());
    let footer = edge_line(&first_lines, Edge::Bottom).map(|i| first_lines[i].trim());

    let mut out = Vec::with_capacity(fragments.len());
    out.push(first.clone());

    for frag in &fragments[1..] {
        let mut lines: Vec<&str> = frag.lines().collect();

        for (edge, canonical) in [(Edge::Top, header), (Edge::Bottom, footer)] {
            let Some(canonical) = canonical else { continue };
            if let Some(pos) = edge_line(&lines, edge) {
                if lines[pos].trim() == canonical && has_other_text(&lines, pos) {
                    lines.remove(pos);
                }
            }
        }

        out.push(lines.join("\n").trim().to_string());
    }
    out
}

#[derive(Clone, Copy)]
enum Edge {
    Top,
    Bottom,
}

static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)[^>]*?(/?)>").unwrap());

const VOID_TAGS: &[&str] = &["br", "hr", "img", "meta", "link", "input", "wbr", "col"];

/// Index of the first (or last) line with visible text, if that line is
/// self-contained markup.
fn edge_line(lines: &[&str], edge: Edge) -> Option<usize> {
    let is_text = |l: &&str| !visible_text(l).is_empty();
    let pos = match edge {
        Edge::Top => lines.iter().position(|l| is_text(l)),
        Edge::Bottom => lines.iter().rposition(|l| is_text(l)),
    }?;
    tags_balanced(lines[pos]).then_some(pos)
}

fn visible_text(line: &str) -> String {
    RE_TAG.replace_all(line, "").trim().to_string()
}

fn tags_balanced(line: &str) -> bool {
    let mut open: Vec<String> = Vec::new();
    for cap in RE_TAG.captures_iter(line) {
        let name = cap[2].to_ascii_lowercase();
        let closing = !cap[1].is_empty();
        let self_closing = !cap[3].is_empty() || VOID_TAGS.contains(&name.as_str());
        if closing {
            if open.pop().as_deref() != Some(name.as_str()) {
                return false;
            }
        } else if !self_closing {
            open.push(name);
        }
    }
    open.is_empty()
}

fn has_other_text(lines: &[&str], skip: usize) -> bool {
    lines
        .iter()
        .enumerate()
        .any(|(i, l)| i != skip && !visible_text(l).is_empty())
}

/// Merge `fragments` (page order) into one document.
pub async fn synthesize(
    model: &dyn GenerativeModel,
    fragments: &[String],
    config: &DraftConfig,
) -> Result<SynthesizedDocument, DraftError> {
    if fragments.is_empty() {
        return Err(DraftError::Synthesis {
            detail: "no fragments to synthesize".into(),
        });
    }

    let trimmed = trim_repeated_edges(fragments);
    let prompt = prompts::synthesis_prompt(&trimmed);
    let request = ModelRequest::text(config.text_model(), prompt, config)
        .with_schema(OutputSchema::object(&["title", "html"]));

    info!("Synthesizing {} fragment(s)", fragments.len());

    let policy = BackoffPolicy::from_config(config);
    let reply = with_backoff(&policy, "synthesize", || invoke(model, &request, config)).await?;

    let value = normalize_json(&reply.text)?;
    let doc = document_from_value(&value)?;
    debug!("Synthesized '{}' ({} chars)", doc.title, doc.html.len());
    Ok(doc)
}

fn document_from_value(value: &Value) -> Result<SynthesizedDocument, DraftError> {
    let html = value
        .get("html")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DraftError::Synthesis {
            detail: "response has no usable 'html' field".into(),
        })?;
    let title = value
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| DraftError::Synthesis {
            detail: "response has no 'title' field".into(),
        })?;
    Ok(SynthesizedDocument {
        title: title.trim().to_string(),
        html: html.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn repeated_header_and_footer_are_trimmed_after_first() {
        let input = frags(&[
            "<p>ACME SERVICES AGREEMENT</p>\n<p>Art. 1</p>\n<p>Confidential</p>",
            "<p>ACME SERVICES AGREEMENT</p>\n<p>Art. 2</p>\n<p>Confidential</p>",
            "  <p>ACME SERVICES AGREEMENT</p>  \n<p>Art. 3</p>",
        ]);
        let out = trim_repeated_edges(&input);
        assert_eq!(out[0], input[0]);
        assert_eq!(out[1], "<p>Art. 2</p>");
        assert_eq!(out[2], "<p>Art. 3</p>");
    }

    #[test]
    fn distinct_edges_are_left_alone() {
        let input = frags(&["<h1>A</h1>\n<p>x</p>", "<h2>B</h2>\n<p>y</p>"]);
        assert_eq!(trim_repeated_edges(&input), input);
    }

    #[test]
    fn fragment_consisting_only_of_header_is_kept() {
        let input = frags(&["<p>HDR</p>\n<p>x</p>", "<p>HDR</p>"]);
        let out = trim_repeated_edges(&input);
        assert_eq!(out[1], "<p>HDR</p>");
    }

    #[test]
    fn wrapper_lines_are_never_removed() {
        let input = frags(&[
            "<div class=\"page\">\n<p>Article 1</p>\n</div>",
            "<div>\n<p>Article 2</p>\n</div>",
        ]);
        assert_eq!(trim_repeated_edges(&input), input);
    }

    #[test]
    fn header_inside_a_wrapper_is_trimmed_and_wrapper_kept() {
        let input = frags(&[
            "<div class=\"page\">\n<p>ACME LEASE</p>\n<p>Art. 1</p>\n</div>",
            "<div class=\"page\">\n<p>ACME LEASE</p>\n<p>Art. 2</p>\n</div>",
        ]);
        let out = trim_repeated_edges(&input);
        assert_eq!(out[1], "<div class=\"page\">\n<p>Art. 2</p>\n</div>");
    }

    #[test]
    fn unbalanced_edge_line_is_kept() {
        let input = frags(&[
            "<section><p>HDR</p>\n<p>x</p></section>",
            "<section><p>HDR</p>\n<p>y</p></section>",
        ]);
        assert_eq!(trim_repeated_edges(&input), input);
    }

    #[test]
    fn missing_html_is_rejected() {
        let err = document_from_value(&json!({"title": "T"})).unwrap_err();
        assert!(matches!(err, DraftError::Synthesis { .. }));
        let err = document_from_value(&json!({"title": "T", "html": "  "})).unwrap_err();
        assert!(matches!(err, DraftError::Synthesis { .. }));
    }

    #[test]
    fn missing_title_is_rejected() {
        let err = document_from_value(&json!({"html": "<p>x</p>"})).unwrap_err();
        assert!(matches!(err, DraftError::Synthesis { .. }));
    }

    #[test]
    fn complete_value_is_accepted() {
        let doc = document_from_value(&json!({"title": " NDA ", "html": "<p>x</p>"})).unwrap();
        assert_eq!(
            doc,
            SynthesizedDocument {
                title: "NDA".into(),
                html: "<p>x</p>".into()
            }
        );
    }
}
