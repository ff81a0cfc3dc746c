//! Delimited-text and Excel table extraction

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};

use super::{RawTable, TableSource};
use crate::error::{Error, Result};
use crate::types::CellValue;

/// Cell strings read as missing values
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const TRUE_VALUES: &[&str] = &["True", "TRUE", "true"];
const FALSE_VALUES: &[&str] = &["False", "FALSE", "false"];

/// CSV file held in memory
pub struct CsvTable<'a> {
    filename: String,
    data: &'a [u8],
}

impl<'a> CsvTable<'a> {
    pub fn from_bytes(filename: &str, data: &'a [u8]) -> Self {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        Self {
            filename: filename.to_string(),
            data,
        }
    }
}

impl TableSource for CsvTable<'_> {
    fn read_table(&mut self) -> Result<RawTable> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(self.data);

        let mut records = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                Error::extraction(&self.filename, format!("record {}: {}", i + 1, e))
            })?;
            // blank lines carry no data
            if record.len() == 1 && record[0].is_empty() {
                continue;
            }
            records.push(record);
        }

        let mut records = records.into_iter();
        let header: Vec<String> = match records.next() {
            Some(header) => header.iter().map(str::to_string).collect(),
            None => return Err(Error::extraction(&self.filename, "No columns to parse from file")),
        };

        let raw: Vec<Vec<String>> = records
            .map(|r| r.iter().map(str::to_string).collect())
            .collect();

        Ok(RawTable {
            rows: type_columns(raw, header.len()),
            header,
        })
    }
}

/// Infer one scalar type per column and convert the cells
fn type_columns(raw: Vec<Vec<String>>, width: usize) -> Vec<Vec<CellValue>> {
    let columns = raw.iter().map(Vec::len).max().unwrap_or(0).max(width);
    let kinds: Vec<ColumnKind> = (0..columns)
        .map(|col| ColumnKind::infer(raw.iter().filter_map(|row| row.get(col))))
        .collect();

    raw.into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(col, cell)| kinds[col].convert(cell))
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnKind {
    fn infer<'s>(cells: impl Iterator<Item = &'s String>) -> Self {
        let mut all_int = true;
        let mut all_float = true;
        let mut all_bool = true;

        for cell in cells.filter(|c| !is_missing(c)) {
            let trimmed = cell.trim();
            all_int &= trimmed.parse::<i64>().is_ok();
            all_float &= trimmed.parse::<f64>().is_ok();
            all_bool &= parse_bool(cell).is_some();
            if !all_int && !all_float && !all_bool {
                return ColumnKind::Text;
            }
        }

        if all_int {
            ColumnKind::Int
        } else if all_float {
            ColumnKind::Float
        } else if all_bool {
            ColumnKind::Bool
        } else {
            ColumnKind::Text
        }
    }

    fn convert(self, cell: String) -> CellValue {
        if is_missing(&cell) {
            return CellValue::Null;
        }
        let parsed = match self {
            ColumnKind::Int => cell.trim().parse().ok().map(CellValue::Int),
            ColumnKind::Float => cell.trim().parse().ok().map(CellValue::Float),
            ColumnKind::Bool => parse_bool(&cell).map(CellValue::Bool),
            ColumnKind::Text => None,
        };
        parsed.unwrap_or(CellValue::Text(cell))
    }
}

fn is_missing(cell: &str) -> bool {
    NA_VALUES.contains(&cell)
}

fn parse_bool(cell: &str) -> Option<bool> {
    if TRUE_VALUES.contains(&cell) {
        Some(true)
    } else if FALSE_VALUES.contains(&cell) {
        Some(false)
    } else {
        None
    }
}

/// Excel workbook held in memory; the first worksheet is read
pub struct XlsxTable<'a> {
    filename: String,
    workbook: Xlsx<Cursor<&'a [u8]>>,
}

impl<'a> XlsxTable<'a> {
    pub fn from_bytes(filename: &str, data: &'a [u8]) -> Result<Self> {
        let workbook = Xlsx::new(Cursor::new(data))
            .map_err(|e| Error::extraction(filename, format!("Invalid workbook: {}", e)))?;
        Ok(Self {
            filename: filename.to_string(),
            workbook,
        })
    }
}

impl TableSource for XlsxTable<'_> {
    fn read_table(&mut self) -> Result<RawTable> {
        let sheet = self.workbook.sheet_names().first().cloned();
        let range = match self.workbook.worksheet_range_at(0) {
            Some(range) => range.map_err(|e| Error::extraction(&self.filename, e))?,
            None => return Err(Error::extraction(&self.filename, "Workbook has no worksheets")),
        };
        tracing::debug!(
            "Reading worksheet {:?} ({} x {})",
            sheet,
            range.height(),
            range.width()
        );

        let mut rows = range
            .rows()
            .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)));

        let header = match rows.next() {
            Some(row) => row.iter().map(header_name).collect(),
            None => return Ok(RawTable::default()),
        };
        let rows = rows
            .map(|row| row.iter().map(excel_cell).collect())
            .collect();

        Ok(RawTable { header, rows })
    }
}

fn header_name(cell: &Data) -> String {
    match excel_cell(cell) {
        CellValue::Null => String::new(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) => f.to_string(),
        CellValue::Text(s) => s,
    }
}

/// Largest integer magnitude an f64 represents exactly
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

fn excel_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        // Integral numbers are stored as floats by the sheet format
        Data::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_INT => CellValue::Int(*f as i64),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) => CellValue::Text(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}
