//! Format extraction and normalization
//!
//! Format libraries sit behind three small capability traits, one per kind of
//! extracted unit. The normalizer only talks to these traits, so it can be
//! exercised with in-memory fakes.

mod dispatcher;
mod epub;
mod normalizer;
mod pdf;
mod spreadsheet;
mod stata;

pub use dispatcher::Dispatcher;
pub use epub::EpubReader;
pub use normalizer::{html_to_text, normalize_chapters, normalize_pages, normalize_table};
pub use pdf::PdfPages;
pub use spreadsheet::{CsvTable, XlsxTable};
pub use stata::StataTable;

use crate::error::Result;
use crate::types::CellValue;

/// Paginated source: text per page
pub trait PageSource {
    /// Total number of pages in the source
    fn page_count(&self) -> usize;

    /// Text of the page at a 0-based index; `None` when nothing could be extracted
    fn page_text(&self, index: usize) -> Option<String>;
}

/// One document item of an item-structured source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentItem {
    /// Item file name as recorded by the source package
    pub file_name: String,
    /// Raw markup of the item
    pub markup: Vec<u8>,
}

/// Item-structured source: document items in native package order
pub trait DocumentItemSource {
    fn document_items(&mut self) -> Result<Vec<DocumentItem>>;
}

/// Header and rows as read from a tabular source, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Header cells in source order; may contain blanks or duplicates
    pub header: Vec<String>,
    /// Rows in source order; may be shorter than the header
    pub rows: Vec<Vec<CellValue>>,
}

/// Tabular source: a header plus rows of native scalars
pub trait TableSource {
    fn read_table(&mut self) -> Result<RawTable>;
}
