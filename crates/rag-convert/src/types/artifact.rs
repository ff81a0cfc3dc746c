//! Normalized conversion output
//!
//! Two canonical shapes are produced: an ordered list of document units
//! (pages or chapters) and a tabular record set. Both serialize directly
//! into the downloadable JSON artifact.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

/// One page of a paginated document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUnit {
    /// Page number (1-indexed position in the source document)
    pub page_number: u32,
    /// Extracted page text
    pub content: String,
}

/// One document item of an item-structured source (EPUB)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterUnit {
    /// Source item file name
    #[serde(rename = "chapter")]
    pub chapter_id: String,
    /// Item text with markup removed
    pub content: String,
}

/// An atomic piece of extracted content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExtractionUnit {
    Page(PageUnit),
    Chapter(ChapterUnit),
}

impl ExtractionUnit {
    /// Text content of the unit
    pub fn content(&self) -> &str {
        match self {
            ExtractionUnit::Page(p) => &p.content,
            ExtractionUnit::Chapter(c) => &c.content,
        }
    }
}

/// Native scalar value of one table cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Widen an integer to a float, leaving everything else untouched
    pub fn to_float(&self) -> CellValue {
        match self {
            CellValue::Int(i) => CellValue::Float(*i as f64),
            other => other.clone(),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Int(i) => serializer.serialize_i64(*i),
            // JSON has no NaN or infinity
            CellValue::Float(f) if !f.is_finite() => serializer.serialize_none(),
            CellValue::Float(f) => serializer.serialize_f64(*f),
            CellValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Tabular record set
///
/// Rows are stored positionally against `columns`, so every serialized record
/// carries exactly the column keys in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularResult {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl TabularResult {
    /// Build a record set; rows must already match the column count
    pub(crate) fn from_parts(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Look up a cell by row index and column name
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

struct Record<'a> {
    columns: &'a [String],
    values: &'a [CellValue],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct Records<'a>(&'a TabularResult);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.rows.len()))?;
        for values in &self.0.rows {
            seq.serialize_element(&Record {
                columns: &self.0.columns,
                values,
            })?;
        }
        seq.end()
    }
}

impl Serialize for TabularResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("columns", &self.columns)?;
        map.serialize_entry("row_count", &self.rows.len())?;
        map.serialize_entry("data", &Records(self))?;
        map.end()
    }
}

/// Final JSON-serializable conversion result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConversionArtifact {
    Units(Vec<ExtractionUnit>),
    Table(TabularResult),
}

impl ConversionArtifact {
    /// Number of units or rows carried by the artifact
    pub fn len(&self) -> usize {
        match self {
            ConversionArtifact::Units(units) => units.len(),
            ConversionArtifact::Table(table) => table.row_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize as UTF-8 JSON indented by four spaces, non-ASCII unescaped
    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }
}
