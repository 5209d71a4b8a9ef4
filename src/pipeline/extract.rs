//! PDF text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! [`load_manual`] moves the work onto Tokio's blocking pool so the runtime
//! keeps serving the session while a large manual is parsed.
//!
//! The loader sits behind [`DocumentLoader`] so sessions can be exercised
//! without a pdfium binary on the machine.

use crate::error::AgentError;
use crate::manual::ManualDocument;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns the raw bytes of an uploaded file into a [`ManualDocument`].
pub trait DocumentLoader: Send + Sync {
    /// Extract the text of every page, in order.
    fn load(&self, name: &str, bytes: &[u8]) -> Result<ManualDocument, AgentError>;
}

/// Production loader: binds pdfium (downloading it on first use) and reads
/// each page's text layer.
#[derive(Debug, Clone, Default)]
pub struct PdfiumLoader {
    password: Option<String>,
}

impl PdfiumLoader {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

impl DocumentLoader for PdfiumLoader {
    fn load(&self, name: &str, bytes: &[u8]) -> Result<ManualDocument, AgentError> {
        check_magic(name, bytes)?;

        let pdfium = pdfium_auto::bind_pdfium_silent().map_err(|e| AgentError::DocumentRead {
            name: name.to_string(),
            detail: format!("PDF engine unavailable: {e}"),
        })?;

        let password = self.password.as_deref();
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                let detail = if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        "wrong password".to_string()
                    } else {
                        "the PDF is encrypted; provide --password".to_string()
                    }
                } else {
                    err_str
                };
                AgentError::DocumentRead {
                    name: name.to_string(),
                    detail,
                }
            })?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if total == 0 {
            return Err(AgentError::DocumentRead {
                name: name.to_string(),
                detail: "the PDF has no pages".into(),
            });
        }

        let mut texts = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let text = page.text().map_err(|e| AgentError::DocumentRead {
                name: name.to_string(),
                detail: format!("text extraction failed on page {}: {:?}", idx + 1, e),
            })?;
            let content = text.all();
            debug!("Extracted page {} → {} chars", idx + 1, content.len());
            texts.push(content);
        }

        Ok(ManualDocument::from_pages(name, texts))
    }
}

/// Reject anything that does not start with the `%PDF` header.
fn check_magic(name: &str, bytes: &[u8]) -> Result<(), AgentError> {
    if bytes.len() < 4 {
        return Err(AgentError::DocumentRead {
            name: name.to_string(),
            detail: format!("file is too short to be a PDF ({} bytes)", bytes.len()),
        });
    }
    if &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(AgentError::DocumentRead {
            name: name.to_string(),
            detail: format!("not a PDF file, first bytes: {magic:?}"),
        });
    }
    Ok(())
}

/// Run `loader` on the blocking pool.
pub async fn load_manual(
    loader: Arc<dyn DocumentLoader>,
    name: &str,
    bytes: Vec<u8>,
) -> Result<ManualDocument, AgentError> {
    let owned_name = name.to_string();
    let manual = tokio::task::spawn_blocking(move || loader.load(&owned_name, &bytes))
        .await
        .map_err(|e| AgentError::Internal(format!("Extraction task panicked: {}", e)))??;

    info!(
        "Manual '{}' loaded: {} pages, {} chars",
        manual.name,
        manual.page_count,
        manual.text.len()
    );
    Ok(manual)
}
