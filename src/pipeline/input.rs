//! Input resolution: turn a path, URL or byte buffer into a [`SourceDocument`].
//!
//! The document kind is decided from magic bytes, never from the file
//! extension: scanned contracts arrive as `.pdf`, `.jpg`, extension-less
//! downloads, and occasionally mislabelled files. PDFs go through the
//! paginated path; images are a single page.

use crate::error::DraftError;
use std::path::PathBuf;
use tracing::{debug, info};

/// What kind of source the bytes hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    /// Paginated PDF.
    Pdf,
    /// A single raster image with its MIME type.
    Image { mime_type: String },
}

/// A fully loaded source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Display name (file name or URL), used in logs and errors.
    pub name: String,
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Classify `bytes` by magic number.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, DraftError> {
        let name = name.into();
        let kind = sniff_kind(&bytes).ok_or_else(|| DraftError::UnsupportedDocument {
            name: name.clone(),
            magic: bytes.iter().take(8).copied().collect(),
        })?;
        Ok(Self { name, kind, bytes })
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == DocumentKind::Pdf
    }
}

/// Detect PDF or a supported image format from leading bytes.
pub fn sniff_kind(bytes: &[u8]) -> Option<DocumentKind> {
    let image = |mime: &str| {
        Some(DocumentKind::Image {
            mime_type: mime.to_string(),
        })
    };
    if bytes.starts_with(b"%PDF") {
        Some(DocumentKind::Pdf)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        image("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        image("image/png")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        image("image/webp")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        image("image/gif")
    } else {
        None
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or an HTTP(S) URL into a loaded document.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, DraftError> {
    if input.trim().is_empty() {
        return Err(DraftError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<SourceDocument, DraftError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DraftError::PermissionDenied { path: path.clone() },
        _ => DraftError::FileNotFound { path: path.clone() },
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    SourceDocument::from_bytes(path.display().to_string(), bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, DraftError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DraftError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DraftError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DraftError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DraftError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DraftError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    SourceDocument::from_bytes(url, bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/contract.pdf"));
        assert!(is_url("http://example.com/scan.jpg"));
        assert!(!is_url("/tmp/contract.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniffs_supported_kinds() {
        assert_eq!(sniff_kind(b"%PDF-1.7\n"), Some(DocumentKind::Pdf));
        assert_eq!(
            sniff_kind(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(DocumentKind::Image { mime_type: "image/jpeg".into() })
        );
        assert_eq!(
            sniff_kind(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            Some(DocumentKind::Image { mime_type: "image/png".into() })
        );
        assert_eq!(
            sniff_kind(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(DocumentKind::Image { mime_type: "image/webp".into() })
        );
        assert_eq!(sniff_kind(b"hello world"), None);
        assert_eq!(sniff_kind(b""), None);
    }

    #[test]
    fn unsupported_bytes_are_rejected() {
        let err = SourceDocument::from_bytes("notes.txt", b"plain text".to_vec()).unwrap_err();
        assert!(matches!(err, DraftError::UnsupportedDocument { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, DraftError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_image_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bin");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]).unwrap();
        let doc = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert!(!doc.is_pdf());
        assert_eq!(doc.bytes.len(), 7);
    }
}
