//! The maintenance manual currently grounding the conversation.

use serde::Serialize;

/// Text extracted from an uploaded PDF manual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualDocument {
    /// Upload identity: the file name (or last URL segment) it came from.
    pub name: String,
    /// Every page's extracted text, in page order, each followed by `\n`.
    pub text: String,
    /// Number of pages in the PDF.
    pub page_count: usize,
}

impl ManualDocument {
    /// Build a manual from per-page text in page order.
    pub fn from_pages<I, S>(name: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut page_count = 0;
        for page in pages {
            text.push_str(page.as_ref());
            text.push('\n');
            page_count += 1;
        }
        Self {
            name: name.into(),
            text,
            page_count,
        }
    }
}

/// Outcome of [`crate::Session::upload_manual`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualUpload {
    /// A new manual was extracted; the system instruction was rebuilt.
    Loaded { name: String, page_count: usize },
    /// The same identity was already loaded; nothing was reprocessed.
    Unchanged { name: String },
}

impl ManualUpload {
    /// Whether the driver should re-render after this upload.
    pub fn changed(&self) -> bool {
        matches!(self, ManualUpload::Loaded { .. })
    }
}
