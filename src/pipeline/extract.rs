//! PDF text extraction.

use crate::pipeline::types::ExtractionError;
use async_trait::async_trait;
use std::path::Path;

/// Extracts the text of a local document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Return the document text, one newline-terminated block per non-empty page.
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Reads the embedded text layer of digital PDFs; scanned pages yield nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|err| ExtractionError::Malformed(err.to_string()))
        })
        .await
        .map_err(|err| ExtractionError::Worker(err.to_string()))??;

        let page_count = pages.len();
        let text = join_pages(pages);
        tracing::debug!(pages = page_count, chars = text.chars().count(), "Extracted PDF text");
        Ok(text)
    }
}

/// Concatenate page texts, skipping empty pages and terminating each kept page with `\n`.
///
/// Whitespace-only pages are kept and count toward the text length.
pub fn join_pages<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for page in pages {
        let page = page.as_ref();
        if page.is_empty() {
            continue;
        }
        text.push_str(page);
        text.push('\n');
    }
    text
}
