//! PDF page text extraction

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use super::PageSource;
use crate::error::{Error, Result};

/// Extracted text for every page of a PDF
#[derive(Debug, Clone)]
pub struct PdfPages {
    pages: Vec<Option<String>>,
}

impl PdfPages {
    /// Load a PDF and extract text page by page.
    ///
    /// `lopdf` decides whether the file is a PDF at all and how many pages it
    /// has. Page text comes from `pdf-extract`, falling back to `lopdf` when
    /// the primary extractor errors, panics or exceeds `timeout`.
    pub fn from_bytes(filename: &str, data: &[u8], timeout: Duration) -> Result<Self> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::extraction(filename, format!("Failed to load PDF: {}", e)))?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

        let pages = match Self::extract_with_timeout(data, timeout) {
            Ok(pages) if pages.len() == page_numbers.len() => {
                pages.into_iter().map(Some).collect()
            }
            Ok(pages) => {
                tracing::warn!(
                    "pdf-extract returned {} pages for {} ({} expected), using fallback",
                    pages.len(),
                    filename,
                    page_numbers.len()
                );
                Self::extract_fallback(&doc, &page_numbers)
            }
            Err(reason) => {
                tracing::warn!("pdf-extract failed for {}: {}, using fallback", filename, reason);
                Self::extract_fallback(&doc, &page_numbers)
            }
        };

        Ok(Self { pages })
    }

    /// Run pdf-extract on a worker thread so a hang or panic cannot take the request down
    fn extract_with_timeout(
        data: &[u8],
        timeout: Duration,
    ) -> std::result::Result<Vec<String>, String> {
        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem_by_pages(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(pages)) => {
                let _ = handle.join();
                Ok(pages)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e.to_string())
            }
            // The worker cannot be killed; it is detached and its result dropped
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(format!("timed out after {}s", timeout.as_secs()))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err("extraction thread panicked".to_string())
            }
        }
    }

    /// Per-page text through lopdf's own content stream decoder
    fn extract_fallback(doc: &lopdf::Document, page_numbers: &[u32]) -> Vec<Option<String>> {
        page_numbers
            .iter()
            .map(|&number| match doc.extract_text(&[number]) {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::debug!("Could not extract text for page {}: {}", number, e);
                    None
                }
            })
            .collect()
    }
}

impl PageSource for PdfPages {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Option<String> {
        self.pages.get(index).cloned().flatten()
    }
}
