//! Pipeline stages for importing and editing contract documents.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and can be swapped (e.g. a different rasteriser) without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render/chunk ──▶ encode ──▶ extract ──▶ synthesize
//! (path/URL)  (pdfium, 3pp)   (JPEG)    (per chunk)  ({title, html})
//!
//! document ──▶ compact ──▶ edit
//! ```
//!
//! 1. [`input`]      resolve a path or URL and sniff PDF vs image
//! 2. [`render`]     open the PDF with pdfium on a blocking thread
//! 3. [`chunk`]      group pages into batches and stream them in order
//! 4. [`encode`]     JPEG-encode and base64-wrap each page
//! 5. [`extract`]    one model call per batch → HTML fragment
//! 6. [`synthesize`] merge fragments into one document
//! 7. [`compact`] and [`edit`]  whole-document scoped edits
//!
//! Cross-cutting: [`retry`] wraps every model call, [`normalize`] parses
//! every structured reply.

pub mod chunk;
pub mod compact;
pub mod edit;
pub mod encode;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod render;
pub mod retry;
pub mod synthesize;
