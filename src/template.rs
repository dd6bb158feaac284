//! Contract templates and the placeholder grammar.
//!
//! A placeholder is the literal prefix `xxxx_` followed by one or more of
//! `[A-Z0-9_]`. [`ContractTemplate::placeholders`] lists every occurrence
//! in document order, duplicates included; [`ContractTemplate::unique_placeholders`]
//! is the deduplicated view for fill-in forms.
//!
//! `content` is private so that the placeholder list is recomputed on every
//! mutation and the two can never diverge.

use crate::error::DraftError;
use crate::pipeline::synthesize::SynthesizedDocument;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"xxxx_[A-Z0-9_]+").unwrap());

/// Title used when an import produced no title.
pub const IMPORTED_TITLE_FALLBACK: &str = "Imported Framework";
pub const IMPORTED_DESCRIPTION: &str = "Digitized contract architecture synthesized from legacy source.";
pub const IMPORTED_CATEGORY: &str = "External";

/// Every placeholder occurrence in `content`, in order.
pub fn derive_placeholders(content: &str) -> Vec<String> {
    RE_PLACEHOLDER
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Human-readable label: `xxxx_CLIENT_NAME` → `CLIENT NAME`.
pub fn placeholder_label(token: &str) -> String {
    token
        .strip_prefix("xxxx_")
        .unwrap_or(token)
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A contract template with its derived placeholder list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredTemplate", into = "StoredTemplate")]
pub struct ContractTemplate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    content: String,
    placeholders: Vec<String>,
    pub pinned: bool,
}

/// On-disk shape. The placeholder list is written for readers but
/// recomputed on load.
#[derive(Serialize, Deserialize)]
struct StoredTemplate {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    content: String,
    #[serde(default)]
    placeholders: Vec<String>,
    #[serde(default)]
    pinned: bool,
}

impl From<StoredTemplate> for ContractTemplate {
    fn from(s: StoredTemplate) -> Self {
        let mut t = ContractTemplate::new(s.id, s.title, s.description, s.category, s.content);
        t.pinned = s.pinned;
        t
    }
}

impl From<ContractTemplate> for StoredTemplate {
    fn from(t: ContractTemplate) -> Self {
        StoredTemplate {
            id: t.id,
            title: t.title,
            description: t.description,
            category: t.category,
            content: t.content,
            placeholders: t.placeholders,
            pinned: t.pinned,
        }
    }
}

impl ContractTemplate {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let placeholders = derive_placeholders(&content);
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            content,
            placeholders,
            pinned: false,
        }
    }

    /// Build the template produced by a document import.
    pub fn from_import(doc: SynthesizedDocument) -> Self {
        let title = if doc.title.trim().is_empty() {
            IMPORTED_TITLE_FALLBACK.to_string()
        } else {
            doc.title
        };
        Self::new(
            new_id("ocr"),
            title,
            IMPORTED_DESCRIPTION,
            IMPORTED_CATEGORY,
            doc.html,
        )
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Every placeholder occurrence in content order.
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Placeholders without repeats, first-occurrence order.
    pub fn unique_placeholders(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.placeholders
            .iter()
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Replace the content and recompute placeholders.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.placeholders = derive_placeholders(&self.content);
    }

    /// Store the result of a successful scoped edit.
    pub fn apply_edit(&mut self, updated_html: String) {
        debug!(
            "Template {}: content {} → {} chars",
            self.id,
            self.content.len(),
            updated_html.len()
        );
        self.set_content(updated_html);
    }

    pub fn toggle_pin(&mut self) -> bool {
        self.pinned = !self.pinned;
        self.pinned
    }

    /// An independent copy with a fresh id, unpinned.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = new_id("copy");
        copy.title = format!("{} - Copy", self.title);
        copy.pinned = false;
        copy
    }

    /// Content with every occurrence of each supplied placeholder replaced.
    ///
    /// Tokens without a value, or with a blank one, keep their literal text.
    pub fn prefill(&self, values: &HashMap<String, String>) -> String {
        RE_PLACEHOLDER
            .replace_all(&self.content, |caps: &regex::Captures| {
                let token = &caps[0];
                match values.get(token) {
                    Some(v) if !v.trim().is_empty() => v.clone(),
                    _ => token.to_string(),
                }
            })
            .into_owned()
    }

    /// Read a template from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DraftError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => DraftError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => DraftError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        serde_json::from_slice(&bytes).map_err(|e| DraftError::InvalidInput {
            input: format!("{}: {}", path.display(), e),
        })
    }

    /// Write pretty JSON atomically: a temp file in the same directory is
    /// persisted over `path`.
    pub fn save(&self, path: &Path) -> Result<(), DraftError> {
        let mut json = serde_json::to_string_pretty(self)
            .map_err(|e| DraftError::Internal(format!("serialising template: {e}")))?;
        json.push('\n');
        write_atomic(path, json.as_bytes())
    }

    /// The template as a Word-compatible `.doc` (Office-namespaced HTML).
    ///
    /// With `values`, placeholders are filled first as in [`Self::prefill`].
    pub fn export_doc(&self, values: Option<&HashMap<String, String>>) -> String {
        let body = match values {
            Some(v) => self.prefill(v),
            None => self.content.clone(),
        };
        word_document(&self.title, &body)
    }

    /// Write [`Self::export_doc`] to `path` atomically.
    pub fn save_doc(
        &self,
        path: &Path,
        values: Option<&HashMap<String, String>>,
    ) -> Result<(), DraftError> {
        let doc = self.export_doc(values);
        debug!("Exporting '{}' → {} ({} bytes)", self.title, path.display(), doc.len());
        write_atomic(path, doc.as_bytes())
    }
}

/// Wrap an HTML body in the minimal document Word opens as a `.doc`.
pub fn word_document(title: &str, body_html: &str) -> String {
    format!(
        "<html xmlns:o='urn:schemas-microsoft-com:office:office' \
         xmlns:w='urn:schemas-microsoft-com:office:word' \
         xmlns='http://www.w3.org/TR/REC-html40'>\
         <head><meta charset='utf-8'><title>{}</title></head><body>{}</body></html>",
        escape_text(title),
        body_html
    )
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DraftError> {
    let write_err = |source: std::io::Error| DraftError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}
