//! Page text extraction for fetched documents.

use super::fetch::FetchError;
use crate::processing::RawPage;
use pdf_oxide::converters::ConversionOptions;
use std::path::Path;

/// Extract per-page text from a downloaded document.
///
/// PDFs (by extension or `%PDF` header) yield one entry per page, including pages without
/// extractable text. Any other file is decoded as UTF-8 and treated as a single page.
pub fn extract_pages(
    path: &Path,
    bytes: &[u8],
    source_key: &str,
    file_name: &str,
) -> Result<Vec<RawPage>, FetchError> {
    if is_pdf(file_name, bytes) {
        extract_pdf(path, source_key)
    } else {
        extract_text(bytes, source_key)
    }
}

fn is_pdf(file_name: &str, bytes: &[u8]) -> bool {
    file_name.to_ascii_lowercase().ends_with(".pdf") || bytes.starts_with(b"%PDF")
}

fn extract_pdf(path: &Path, source_key: &str) -> Result<Vec<RawPage>, FetchError> {
    let path = path.to_string_lossy();
    let mut doc = pdf_oxide::PdfDocument::open(&*path)
        .map_err(|error| FetchError::CorruptInput(format!("{source_key}: {error}")))?;
    let page_count = doc
        .page_count()
        .map_err(|error| FetchError::CorruptInput(format!("{source_key}: {error}")))?;
    if page_count == 0 {
        return Err(FetchError::CorruptInput(format!("{source_key}: PDF has no pages")));
    }
    let options = ConversionOptions {
        include_images: false,
        ..ConversionOptions::default()
    };

    let total_pages = page_count as u32;
    let mut pages = Vec::with_capacity(page_count);
    for page_index in 0..page_count {
        let text = doc.to_markdown(page_index, &options).map_err(|error| {
            FetchError::CorruptInput(format!(
                "{source_key}: page {}: {error}",
                page_index + 1
            ))
        })?;
        pages.push(RawPage {
            text,
            page_number: page_index as u32 + 1,
            source_key: source_key.to_string(),
            total_pages,
        });
    }

    tracing::debug!(source_key, pages = page_count, "Extracted PDF pages");
    Ok(pages)
}

fn extract_text(bytes: &[u8], source_key: &str) -> Result<Vec<RawPage>, FetchError> {
    let text = std::str::from_utf8(bytes).map_err(|error| {
        FetchError::CorruptInput(format!("{source_key}: not valid UTF-8: {error}"))
    })?;
    Ok(vec![RawPage {
        text: text.to_string(),
        page_number: 1,
        source_key: source_key.to_string(),
        total_pages: 1,
    }])
}
