//! Map extractor output onto the two canonical artifact shapes

use std::collections::HashSet;

use super::{DocumentItemSource, PageSource, RawTable, TableSource};
use crate::error::{Error, Result};
use crate::types::{CellValue, ChapterUnit, ExtractionUnit, PageUnit, TabularResult};

/// Build page units, dropping pages without text
pub fn normalize_pages(source: &impl PageSource) -> Vec<ExtractionUnit> {
    let total = source.page_count();
    let mut units = Vec::with_capacity(total);

    for index in 0..total {
        match source.page_text(index) {
            Some(text) if !text.trim().is_empty() => {
                units.push(ExtractionUnit::Page(PageUnit {
                    page_number: index as u32 + 1,
                    content: text,
                }));
            }
            _ => tracing::debug!("Page {} has no extractable text, skipping", index + 1),
        }
    }

    tracing::debug!("Kept {} of {} pages", units.len(), total);
    units
}

/// Build chapter units from document items, dropping items without text
pub fn normalize_chapters(source: &mut impl DocumentItemSource) -> Result<Vec<ExtractionUnit>> {
    let items = source.document_items()?;
    let total = items.len();

    let units: Vec<ExtractionUnit> = items
        .into_iter()
        .filter_map(|item| {
            let content = html_to_text(&item.markup);
            if content.trim().is_empty() {
                tracing::debug!("Document item {} has no text, skipping", item.file_name);
                return None;
            }
            Some(ExtractionUnit::Chapter(ChapterUnit {
                chapter_id: item.file_name,
                content,
            }))
        })
        .collect();

    tracing::debug!("Kept {} of {} document items", units.len(), total);
    Ok(units)
}

/// Reduce HTML/XHTML markup to its concatenated text content
pub fn html_to_text(markup: &[u8]) -> String {
    let html = String::from_utf8_lossy(markup);
    let document = scraper::Html::parse_document(&html);
    document.root_element().text().collect()
}

/// Build a record set with unique column names and rectangular rows
pub fn normalize_table(source_name: &str, source: &mut impl TableSource) -> Result<TabularResult> {
    let RawTable { header, rows } = source.read_table()?;
    let columns = unique_column_names(header);
    let width = columns.len();

    let mut rows = rows
        .into_iter()
        .enumerate()
        .map(|(i, mut row)| {
            if row.len() > width {
                return Err(Error::extraction(
                    source_name,
                    format!("row {} has {} fields, expected {}", i + 1, row.len(), width),
                ));
            }
            row.resize(width, CellValue::Null);
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    widen_integer_columns(&mut rows, width);

    Ok(TabularResult::from_parts(columns, rows))
}

/// Blank names become `Unnamed: <i>`, repeats get a `.<n>` suffix
fn unique_column_names(header: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(header.len());
    let mut columns = Vec::with_capacity(header.len());

    for (i, name) in header.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name
        };

        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        seen.insert(candidate.clone());
        columns.push(candidate);
    }

    columns
}

/// A numeric column mixing integers with floats or missing cells becomes all floats
fn widen_integer_columns(rows: &mut [Vec<CellValue>], width: usize) {
    for col in 0..width {
        let mut has_int = false;
        let mut has_gap = false;
        let mut numeric = true;

        for row in rows.iter() {
            match &row[col] {
                CellValue::Int(_) => has_int = true,
                CellValue::Float(_) | CellValue::Null => has_gap = true,
                _ => {
                    numeric = false;
                    break;
                }
            }
        }

        if numeric && has_int && has_gap {
            for row in rows.iter_mut() {
                row[col] = row[col].to_float();
            }
        }
    }
}
