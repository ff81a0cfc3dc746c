//! Stata `.dta` reader
//!
//! Handles releases 113-115 (binary header) and 117-119 (tagged header with a
//! section map), in either byte order. Numeric missing codes become nulls,
//! daily and millisecond date formats become ISO-8601 text, value labels are
//! applied to labeled variables, and strL references are resolved.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveDate};

use super::{RawTable, TableSource};
use crate::error::{Error, Result};
use crate::types::CellValue;

type ParseResult<T> = std::result::Result<T, String>;

/// Number of offsets in the section map of tagged releases
const MAP_ENTRIES: usize = 14;

/// Milliseconds between 1960-01-01 (Stata epoch) and 1970-01-01
const STATA_EPOCH_MS: i64 = -315_619_200_000;

/// Stata data file held in memory
pub struct StataTable<'a> {
    filename: String,
    data: &'a [u8],
}

impl<'a> StataTable<'a> {
    pub fn from_bytes(filename: &str, data: &'a [u8]) -> Self {
        Self {
            filename: filename.to_string(),
            data,
        }
    }
}

impl TableSource for StataTable<'_> {
    fn read_table(&mut self) -> Result<RawTable> {
        let parsed = if self.data.starts_with(b"<stata_dta>") {
            parse_tagged(self.data)
        } else {
            parse_binary(self.data)
        };
        let file = parsed.map_err(|msg| Error::extraction(&self.filename, msg))?;

        tracing::debug!(
            "Stata release {}: {} variables, {} observations",
            file.release,
            file.variables.len(),
            file.rows.len()
        );
        Ok(file.into_table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarType {
    Str(usize),
    StrL,
    Byte,
    Int,
    Long,
    Float,
    Double,
}

impl VarType {
    fn from_binary_code(code: u8) -> ParseResult<Self> {
        match code {
            1..=244 => Ok(VarType::Str(code as usize)),
            251 => Ok(VarType::Byte),
            252 => Ok(VarType::Int),
            253 => Ok(VarType::Long),
            254 => Ok(VarType::Float),
            255 => Ok(VarType::Double),
            other => Err(format!("unknown variable type code {}", other)),
        }
    }

    fn from_tagged_code(code: u16) -> ParseResult<Self> {
        match code {
            1..=2045 => Ok(VarType::Str(code as usize)),
            32768 => Ok(VarType::StrL),
            65526 => Ok(VarType::Double),
            65527 => Ok(VarType::Float),
            65528 => Ok(VarType::Long),
            65529 => Ok(VarType::Int),
            65530 => Ok(VarType::Byte),
            other => Err(format!("unknown variable type code {}", other)),
        }
    }

    fn width(&self) -> usize {
        match self {
            VarType::Str(n) => *n,
            VarType::StrL => 8,
            VarType::Byte => 1,
            VarType::Int => 2,
            VarType::Long | VarType::Float => 4,
            VarType::Double => 8,
        }
    }
}

#[derive(Debug, Clone)]
struct Variable {
    name: String,
    kind: VarType,
    format: String,
    value_labels: String,
}

/// Raw cell before strL resolution and label/date conversion
#[derive(Debug, Clone, PartialEq)]
enum RawCell {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
    StrRef(u64, u64),
}

#[derive(Debug)]
struct StataFile {
    release: u16,
    variables: Vec<Variable>,
    rows: Vec<Vec<RawCell>>,
    strls: HashMap<(u64, u64), String>,
    labels: HashMap<String, HashMap<i64, String>>,
}

impl StataFile {
    fn into_table(self) -> RawTable {
        let header = self.variables.iter().map(|v| v.name.clone()).collect();
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&self.variables)
                    .map(|(cell, var)| convert_cell(cell, var, &self.strls, &self.labels))
                    .collect()
            })
            .collect();
        RawTable { header, rows }
    }
}

fn convert_cell(
    cell: RawCell,
    var: &Variable,
    strls: &HashMap<(u64, u64), String>,
    labels: &HashMap<String, HashMap<i64, String>>,
) -> CellValue {
    let (numeric, integer) = match cell {
        RawCell::Missing => return CellValue::Null,
        RawCell::Text(s) => return CellValue::Text(s),
        RawCell::StrRef(0, 0) => return CellValue::Text(String::new()),
        RawCell::StrRef(v, o) => {
            return CellValue::Text(strls.get(&(v, o)).cloned().unwrap_or_default())
        }
        RawCell::Int(i) => (i as f64, Some(i)),
        RawCell::Float(f) => (f, None),
    };

    if let Some(label) = labels
        .get(&var.value_labels)
        .filter(|_| numeric.fract() == 0.0)
        .and_then(|table| table.get(&(numeric as i64)))
    {
        return CellValue::Text(label.clone());
    }

    if let Some(date) = format_date(&var.format, numeric) {
        return CellValue::Text(date);
    }

    match integer {
        Some(i) => CellValue::Int(i),
        None => CellValue::Float(numeric),
    }
}

/// Render `%td` (days) and `%tc`/`%tC` (milliseconds) values relative to 1960-01-01
fn format_date(format: &str, value: f64) -> Option<String> {
    if format.starts_with("%td") || format.starts_with("%d") {
        let epoch = NaiveDate::from_ymd_opt(1960, 1, 1)?;
        let days = i32::try_from(value.floor() as i64).ok()?;
        let date = NaiveDate::from_num_days_from_ce_opt(epoch.num_days_from_ce().checked_add(days)?)?;
        Some(date.format("%Y-%m-%d").to_string())
    } else if format.starts_with("%tc") || format.starts_with("%tC") {
        let millis = (value as i64).checked_add(STATA_EPOCH_MS)?;
        let datetime = DateTime::from_timestamp_millis(millis)?;
        Some(datetime.naive_utc().format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
    } else {
        None
    }
}

/// Bounds-checked reader over the file bytes
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    order: ByteOrder,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            order: ByteOrder::Little,
        }
    }

    fn seek(&mut self, pos: usize) -> ParseResult<()> {
        if pos > self.buf.len() {
            return Err(format!("offset {} is past end of file", pos));
        }
        self.pos = pos;
        Ok(())
    }

    fn take(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| format!("unexpected end of file at offset {}", self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> ParseResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn peek(&self, tag: &str) -> bool {
        self.buf[self.pos..].starts_with(tag.as_bytes())
    }

    fn consume(&mut self, tag: &str) -> ParseResult<()> {
        if self.peek(tag) {
            self.pos += tag.len();
            Ok(())
        } else {
            Err(format!("expected {} at offset {}", tag, self.pos))
        }
    }

    fn u8(&mut self) -> ParseResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> ParseResult<u16> {
        let b: [u8; 2] = self.array()?;
        Ok(match self.order {
            ByteOrder::Big => u16::from_be_bytes(b),
            ByteOrder::Little => u16::from_le_bytes(b),
        })
    }

    fn u32(&mut self) -> ParseResult<u32> {
        let b: [u8; 4] = self.array()?;
        Ok(match self.order {
            ByteOrder::Big => u32::from_be_bytes(b),
            ByteOrder::Little => u32::from_le_bytes(b),
        })
    }

    fn u64(&mut self) -> ParseResult<u64> {
        let b: [u8; 8] = self.array()?;
        Ok(match self.order {
            ByteOrder::Big => u64::from_be_bytes(b),
            ByteOrder::Little => u64::from_le_bytes(b),
        })
    }

    fn i32(&mut self) -> ParseResult<i32> {
        Ok(self.u32()? as i32)
    }

    /// Fixed-width, NUL-padded string field
    fn fixed_str(&mut self, width: usize, utf8: bool) -> ParseResult<String> {
        Ok(decode_str(self.take(width)?, utf8))
    }
}

fn decode_str(bytes: &[u8], utf8: bool) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..end];
    if utf8 {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Releases 113, 114 and 115
fn parse_binary(buf: &[u8]) -> ParseResult<StataFile> {
    let mut cur = Cursor::new(buf);
    let release = cur.u8()? as u16;
    if !(113..=115).contains(&release) {
        return Err(format!("unsupported Stata release {}", release));
    }
    cur.order = match cur.u8()? {
        1 => ByteOrder::Big,
        2 => ByteOrder::Little,
        other => return Err(format!("invalid byte order marker {}", other)),
    };
    cur.take(2)?; // filetype, unused
    let nvar = cur.u16()? as usize;
    let nobs = cur.u32()? as u64;
    cur.take(81 + 18)?; // data label, timestamp

    let types = cur
        .take(nvar)?
        .iter()
        .map(|&code| VarType::from_binary_code(code))
        .collect::<ParseResult<Vec<_>>>()?;
    let names = (0..nvar)
        .map(|_| cur.fixed_str(33, false))
        .collect::<ParseResult<Vec<_>>>()?;
    cur.take(2 * (nvar + 1))?; // sort order
    let format_width = if release == 113 { 12 } else { 49 };
    let formats = (0..nvar)
        .map(|_| cur.fixed_str(format_width, false))
        .collect::<ParseResult<Vec<_>>>()?;
    let label_names = (0..nvar)
        .map(|_| cur.fixed_str(33, false))
        .collect::<ParseResult<Vec<_>>>()?;
    cur.take(81 * nvar)?; // variable labels

    // expansion fields
    loop {
        let kind = cur.u8()?;
        let len = cur.u32()? as usize;
        if kind == 0 && len == 0 {
            break;
        }
        cur.take(len)?;
    }

    let variables = build_variables(names, types, formats, label_names);
    let rows = read_rows(&mut cur, &variables, nobs, release)?;

    let mut labels = HashMap::new();
    while cur.pos + 4 <= buf.len() {
        let len = cur.i32()?;
        let name = cur.fixed_str(33, false)?;
        cur.take(3)?;
        let table = cur.take(usize::try_from(len).map_err(|_| "negative label table length")?)?;
        labels.insert(name, parse_label_table(table, cur.order, false)?);
    }

    Ok(StataFile {
        release,
        variables,
        rows,
        strls: HashMap::new(),
        labels,
    })
}

/// Releases 117, 118 and 119
fn parse_tagged(buf: &[u8]) -> ParseResult<StataFile> {
    let mut cur = Cursor::new(buf);
    cur.consume("<stata_dta>")?;
    cur.consume("<header>")?;
    cur.consume("<release>")?;
    let release: u16 = std::str::from_utf8(cur.take(3)?)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or("unreadable release number")?;
    if !(117..=119).contains(&release) {
        return Err(format!("unsupported Stata release {}", release));
    }
    cur.consume("</release>")?;
    cur.consume("<byteorder>")?;
    cur.order = match cur.take(3)? {
        b"MSF" => ByteOrder::Big,
        b"LSF" => ByteOrder::Little,
        _ => return Err("invalid byte order marker".to_string()),
    };
    cur.consume("</byteorder>")?;

    cur.consume("<K>")?;
    let nvar = if release == 119 { cur.u32()? as usize } else { cur.u16()? as usize };
    cur.consume("</K>")?;
    cur.consume("<N>")?;
    let nobs = if release == 117 { cur.u32()? as u64 } else { cur.u64()? };
    cur.consume("</N>")?;
    cur.consume("<label>")?;
    let label_len = if release == 117 { cur.u8()? as usize } else { cur.u16()? as usize };
    cur.take(label_len)?;
    cur.consume("</label>")?;
    cur.consume("<timestamp>")?;
    let stamp_len = cur.u8()? as usize;
    cur.take(stamp_len)?;
    cur.consume("</timestamp>")?;
    cur.consume("</header>")?;

    cur.consume("<map>")?;
    let mut map = [0usize; MAP_ENTRIES];
    for slot in map.iter_mut() {
        *slot = usize::try_from(cur.u64()?).map_err(|_| "section offset out of range")?;
    }

    let utf8 = release >= 118;
    let name_width = if utf8 { 129 } else { 33 };
    let format_width = if utf8 { 57 } else { 49 };

    cur.seek(map[2])?;
    cur.consume("<variable_types>")?;
    let types = (0..nvar)
        .map(|_| cur.u16().and_then(VarType::from_tagged_code))
        .collect::<ParseResult<Vec<_>>>()?;

    cur.seek(map[3])?;
    cur.consume("<varnames>")?;
    let names = (0..nvar)
        .map(|_| cur.fixed_str(name_width, utf8))
        .collect::<ParseResult<Vec<_>>>()?;

    cur.seek(map[5])?;
    cur.consume("<formats>")?;
    let formats = (0..nvar)
        .map(|_| cur.fixed_str(format_width, utf8))
        .collect::<ParseResult<Vec<_>>>()?;

    cur.seek(map[6])?;
    cur.consume("<value_label_names>")?;
    let label_names = (0..nvar)
        .map(|_| cur.fixed_str(name_width, utf8))
        .collect::<ParseResult<Vec<_>>>()?;

    let variables = build_variables(names, types, formats, label_names);

    cur.seek(map[9])?;
    cur.consume("<data>")?;
    let rows = read_rows(&mut cur, &variables, nobs, release)?;
    cur.consume("</data>")?;

    cur.seek(map[10])?;
    cur.consume("<strls>")?;
    let mut strls = HashMap::new();
    while cur.peek("GSO") {
        cur.consume("GSO")?;
        let v = cur.u32()? as u64;
        let o = if release == 117 { cur.u32()? as u64 } else { cur.u64()? };
        let kind = cur.u8()?;
        let len = cur.u32()? as usize;
        let bytes = cur.take(len)?;
        let text = match kind {
            130 => decode_str(bytes, utf8),
            _ => String::from_utf8_lossy(bytes).into_owned(),
        };
        strls.insert((v, o), text);
    }
    cur.consume("</strls>")?;

    cur.seek(map[11])?;
    cur.consume("<value_labels>")?;
    let mut labels = HashMap::new();
    while cur.peek("<lbl>") {
        cur.consume("<lbl>")?;
        let len = cur.i32()?;
        let name = cur.fixed_str(name_width, utf8)?;
        cur.take(3)?;
        let table = cur.take(usize::try_from(len).map_err(|_| "negative label table length")?)?;
        labels.insert(name, parse_label_table(table, cur.order, utf8)?);
        cur.consume("</lbl>")?;
    }
    cur.consume("</value_labels>")?;

    Ok(StataFile {
        release,
        variables,
        rows,
        strls,
        labels,
    })
}

fn build_variables(
    names: Vec<String>,
    types: Vec<VarType>,
    formats: Vec<String>,
    label_names: Vec<String>,
) -> Vec<Variable> {
    names
        .into_iter()
        .zip(types)
        .zip(formats)
        .zip(label_names)
        .map(|(((name, kind), format), value_labels)| Variable {
            name,
            kind,
            format,
            value_labels,
        })
        .collect()
}

fn read_rows(
    cur: &mut Cursor<'_>,
    variables: &[Variable],
    nobs: u64,
    release: u16,
) -> ParseResult<Vec<Vec<RawCell>>> {
    let record_width: usize = variables.iter().map(|v| v.kind.width()).sum();
    if record_width == 0 && nobs > 0 {
        return Err(format!("{} observations declared without any variables", nobs));
    }
    let remaining = cur.buf.len() - cur.pos;
    let needed = usize::try_from(nobs)
        .ok()
        .and_then(|n| n.checked_mul(record_width))
        .filter(|&n| n <= remaining)
        .ok_or_else(|| format!("data section truncated: {} observations declared", nobs))?;
    tracing::trace!("Reading {} bytes of observations", needed);

    let utf8 = release >= 118;
    // bounded by the bytes actually present
    let mut rows = Vec::with_capacity(needed / record_width.max(1));
    for _ in 0..nobs {
        let row = variables
            .iter()
            .map(|var| read_cell(cur, var.kind, release, utf8))
            .collect::<ParseResult<Vec<_>>>()?;
        rows.push(row);
    }
    Ok(rows)
}

fn read_cell(cur: &mut Cursor<'_>, kind: VarType, release: u16, utf8: bool) -> ParseResult<RawCell> {
    Ok(match kind {
        VarType::Str(width) => RawCell::Text(cur.fixed_str(width, utf8)?),
        VarType::StrL => {
            let raw = cur.u64()?;
            let v_bits = match release {
                117 => 32,
                118 => 16,
                _ => 24,
            };
            // (v, o) is packed with v first in file order
            let (v, o) = match cur.order {
                ByteOrder::Little => (raw & ((1 << v_bits) - 1), raw >> v_bits),
                ByteOrder::Big => (raw >> (64 - v_bits), raw & ((1 << (64 - v_bits)) - 1)),
            };
            RawCell::StrRef(v, o)
        }
        VarType::Byte => {
            let v = cur.u8()? as i8;
            if v > 100 { RawCell::Missing } else { RawCell::Int(v as i64) }
        }
        VarType::Int => {
            let v = cur.u16()? as i16;
            if v > 32_740 { RawCell::Missing } else { RawCell::Int(v as i64) }
        }
        VarType::Long => {
            let v = cur.i32()?;
            if v > 2_147_483_620 { RawCell::Missing } else { RawCell::Int(v as i64) }
        }
        VarType::Float => {
            let v = f32::from_bits(cur.u32()?);
            // system missing `.` is 2^127; everything at or above it is missing
            if v.is_nan() || v >= f32::from_bits(0x7f00_0000) {
                RawCell::Missing
            } else {
                RawCell::Float(v as f64)
            }
        }
        VarType::Double => {
            let v = f64::from_bits(cur.u64()?);
            // system missing `.` is 2^1023
            if v.is_nan() || v >= f64::from_bits(0x7fe0_0000_0000_0000) {
                RawCell::Missing
            } else {
                RawCell::Float(v)
            }
        }
    })
}

/// Value label table: n, txtlen, off[n], val[n], txt
fn parse_label_table(table: &[u8], order: ByteOrder, utf8: bool) -> ParseResult<HashMap<i64, String>> {
    let mut cur = Cursor::new(table);
    cur.order = order;
    let n = usize::try_from(cur.i32()?).map_err(|_| "negative label count")?;
    let text_len = usize::try_from(cur.i32()?).map_err(|_| "negative label text length")?;
    let offsets = (0..n)
        .map(|_| cur.u32().map(|o| o as usize))
        .collect::<ParseResult<Vec<_>>>()?;
    let values = (0..n)
        .map(|_| cur.i32())
        .collect::<ParseResult<Vec<_>>>()?;
    let text = cur.take(text_len)?;

    let mut labels = HashMap::with_capacity(n);
    for (offset, value) in offsets.into_iter().zip(values) {
        let label = text
            .get(offset..)
            .map(|bytes| decode_str(bytes, utf8))
            .ok_or_else(|| format!("label offset {} out of range", offset))?;
        labels.insert(value as i64, label);
    }
    Ok(labels)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Byte-level builders for small Stata files

    /// Column description for fixture files
    pub enum Col<'a> {
        Byte(&'a str, Vec<i8>),
        Double(&'a str, &'a str, Vec<f64>),
        Str(&'a str, usize, Vec<&'a str>),
        /// strL column; values are stored in the strls section
        StrL(&'a str, Vec<&'a str>),
    }

    impl Col<'_> {
        fn name(&self) -> &str {
            match self {
                Col::Byte(n, _) | Col::Double(n, _, _) | Col::Str(n, _, _) | Col::StrL(n, _) => *n,
            }
        }

        fn format(&self) -> &str {
            match self {
                Col::Double(_, f, _) => *f,
                Col::Str(..) | Col::StrL(..) => "%9s",
                Col::Byte(..) => "%8.0g",
            }
        }

        fn len(&self) -> usize {
            match self {
                Col::Byte(_, v) => v.len(),
                Col::Double(_, _, v) => v.len(),
                Col::Str(_, _, v) | Col::StrL(_, v) => v.len(),
            }
        }
    }

    /// Output buffer writing integers in the file's byte order
    struct Out {
        bytes: Vec<u8>,
        big: bool,
    }

    impl Out {
        fn new(big: bool) -> Self {
            Self { bytes: Vec::new(), big }
        }

        fn raw(&mut self, bytes: &[u8]) {
            self.bytes.extend_from_slice(bytes);
        }

        fn padded(&mut self, s: &str, width: usize) {
            let mut field = s.as_bytes().to_vec();
            field.resize(width, 0);
            self.raw(&field);
        }

        fn u8(&mut self, v: u8) {
            self.bytes.push(v);
        }

        fn u16(&mut self, v: u16) {
            let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
            self.raw(&b);
        }

        fn u32(&mut self, v: u32) {
            let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
            self.raw(&b);
        }

        fn u64(&mut self, v: u64) {
            let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
            self.raw(&b);
        }

        fn i32(&mut self, v: i32) {
            self.u32(v as u32);
        }

        fn patch_u64(&mut self, at: usize, v: u64) {
            let b = if self.big { v.to_be_bytes() } else { v.to_le_bytes() };
            self.bytes[at..at + 8].copy_from_slice(&b);
        }

        fn len(&self) -> usize {
            self.bytes.len()
        }
    }

    fn nobs(cols: &[Col<'_>]) -> usize {
        cols.first().map_or(0, |c| c.len())
    }

    /// Label table body: n, txtlen, off[n], val[n], txt
    fn label_table(big: bool, labels: &[(i32, &str)]) -> Vec<u8> {
        let mut txt = Vec::new();
        let mut offsets = Vec::new();
        for (_, label) in labels {
            offsets.push(txt.len() as u32);
            txt.extend(label.as_bytes());
            txt.push(0);
        }

        let mut table = Out::new(big);
        table.i32(labels.len() as i32);
        table.i32(txt.len() as i32);
        for off in offsets {
            table.u32(off);
        }
        for (value, _) in labels {
            table.i32(*value);
        }
        table.raw(&txt);
        table.bytes
    }

    /// Build a file of the given release (113-115 or 117-119) and byte order.
    ///
    /// A non-empty `labels` set is attached to the first column under the
    /// name `lbl`. strL columns need release 117 or later.
    pub fn dta(release: u16, big_endian: bool, cols: &[Col<'_>], labels: &[(i32, &str)]) -> Vec<u8> {
        if release >= 117 {
            tagged(release, big_endian, cols, labels)
        } else {
            binary(release, big_endian, cols, labels)
        }
    }

    /// Release 114, little-endian, without value labels
    pub fn dta_114(cols: &[Col<'_>]) -> Vec<u8> {
        dta(114, false, cols, &[])
    }

    /// Release 118, little-endian
    pub fn dta_118(cols: &[Col<'_>], labels: &[(i32, &str)]) -> Vec<u8> {
        dta(118, false, cols, labels)
    }

    fn binary(release: u16, big: bool, cols: &[Col<'_>], labels: &[(i32, &str)]) -> Vec<u8> {
        let nobs = nobs(cols);
        let mut out = Out::new(big);
        out.raw(&[release as u8, if big { 1 } else { 2 }, 1, 0]);
        out.u16(cols.len() as u16);
        out.u32(nobs as u32);
        out.padded("fixture", 81);
        out.padded("01 Jan 2024 10:00", 18);
        for col in cols {
            out.u8(match col {
                Col::Byte(..) => 251,
                Col::Double(..) => 255,
                Col::Str(_, w, _) => *w as u8,
                Col::StrL(..) => panic!("strL needs release 117+"),
            });
        }
        for col in cols {
            out.padded(col.name(), 33);
        }
        out.raw(&vec![0u8; 2 * (cols.len() + 1)]);
        let format_width = if release == 113 { 12 } else { 49 };
        for col in cols {
            out.padded(col.format(), format_width);
        }
        for i in 0..cols.len() {
            out.padded(if i == 0 && !labels.is_empty() { "lbl" } else { "" }, 33);
        }
        out.raw(&vec![0u8; 81 * cols.len()]);
        out.raw(&[0u8; 5]);

        for row in 0..nobs {
            for col in cols {
                match col {
                    Col::Byte(_, v) => out.u8(v[row] as u8),
                    Col::Double(_, _, v) => out.u64(v[row].to_bits()),
                    Col::Str(_, w, v) => out.padded(v[row], *w),
                    Col::StrL(..) => unreachable!(),
                }
            }
        }

        if !labels.is_empty() {
            let table = label_table(big, labels);
            out.i32(table.len() as i32);
            out.padded("lbl", 33);
            out.raw(&[0u8; 3]);
            out.raw(&table);
        }
        out.bytes
    }

    fn tagged(release: u16, big: bool, cols: &[Col<'_>], labels: &[(i32, &str)]) -> Vec<u8> {
        let nobs = nobs(cols);
        let wide = release >= 118;
        let name_width = if wide { 129 } else { 33 };
        let v_bits = match release {
            117 => 32,
            118 => 16,
            _ => 24,
        };
        let mut out = Out::new(big);
        let mut map = [0u64; 14];

        out.raw(format!("<stata_dta><header><release>{}</release>", release).as_bytes());
        out.raw(if big { b"<byteorder>MSF</byteorder>" } else { b"<byteorder>LSF</byteorder>" });
        out.raw(b"<K>");
        if release == 119 {
            out.u32(cols.len() as u32);
        } else {
            out.u16(cols.len() as u16);
        }
        out.raw(b"</K><N>");
        if release == 117 {
            out.u32(nobs as u32);
        } else {
            out.u64(nobs as u64);
        }
        out.raw(b"</N><label>");
        if release == 117 {
            out.u8(0);
        } else {
            out.u16(0);
        }
        out.raw(b"</label><timestamp>");
        out.u8(0);
        out.raw(b"</timestamp></header>");

        map[1] = out.len() as u64;
        let map_pos = out.len() + "<map>".len();
        out.raw(b"<map>");
        out.raw(&[0u8; 14 * 8]);
        out.raw(b"</map>");

        map[2] = out.len() as u64;
        out.raw(b"<variable_types>");
        for col in cols {
            out.u16(match col {
                Col::Byte(..) => 65530,
                Col::Double(..) => 65526,
                Col::Str(_, w, _) => *w as u16,
                Col::StrL(..) => 32768,
            });
        }
        out.raw(b"</variable_types>");

        map[3] = out.len() as u64;
        out.raw(b"<varnames>");
        for col in cols {
            out.padded(col.name(), name_width);
        }
        out.raw(b"</varnames>");

        map[4] = out.len() as u64;
        out.raw(b"<sortlist>");
        out.raw(&vec![0u8; 2 * (cols.len() + 1)]);
        out.raw(b"</sortlist>");

        map[5] = out.len() as u64;
        out.raw(b"<formats>");
        for col in cols {
            out.padded(col.format(), if wide { 57 } else { 49 });
        }
        out.raw(b"</formats>");

        map[6] = out.len() as u64;
        out.raw(b"<value_label_names>");
        for i in 0..cols.len() {
            out.padded(if i == 0 && !labels.is_empty() { "lbl" } else { "" }, name_width);
        }
        out.raw(b"</value_label_names>");

        map[7] = out.len() as u64;
        out.raw(b"<variable_labels>");
        let label_width = if wide { 321 } else { 81 };
        out.raw(&vec![0u8; label_width * cols.len()]);
        out.raw(b"</variable_labels>");

        map[8] = out.len() as u64;
        out.raw(b"<characteristics></characteristics>");

        map[9] = out.len() as u64;
        out.raw(b"<data>");
        let mut gsos = Vec::new();
        for row in 0..nobs {
            for (var, col) in cols.iter().enumerate() {
                match col {
                    Col::Byte(_, v) => out.u8(v[row] as u8),
                    Col::Double(_, _, v) => out.u64(v[row].to_bits()),
                    Col::Str(_, w, v) => out.padded(v[row], *w),
                    Col::StrL(_, v) => {
                        let (v_idx, o_idx) = (var as u64 + 1, row as u64 + 1);
                        // v comes first in file order
                        out.u64(if big {
                            (v_idx << (64 - v_bits)) | o_idx
                        } else {
                            v_idx | (o_idx << v_bits)
                        });
                        gsos.push((v_idx, o_idx, v[row]));
                    }
                }
            }
        }
        out.raw(b"</data>");

        map[10] = out.len() as u64;
        out.raw(b"<strls>");
        for (v, o, text) in gsos {
            out.raw(b"GSO");
            out.u32(v as u32);
            if release == 117 {
                out.u32(o as u32);
            } else {
                out.u64(o);
            }
            out.u8(130);
            out.u32(text.len() as u32 + 1);
            out.raw(text.as_bytes());
            out.u8(0);
        }
        out.raw(b"</strls>");

        map[11] = out.len() as u64;
        out.raw(b"<value_labels>");
        if !labels.is_empty() {
            let table = label_table(big, labels);
            out.raw(b"<lbl>");
            out.i32(table.len() as i32);
            out.padded("lbl", name_width);
            out.raw(&[0u8; 3]);
            out.raw(&table);
            out.raw(b"</lbl>");
        }
        out.raw(b"</value_labels>");

        map[12] = out.len() as u64;
        out.raw(b"</stata_dta>");
        map[13] = out.len() as u64;

        for (i, offset) in map.iter().enumerate() {
            out.patch_u64(map_pos + i * 8, *offset);
        }
        out.bytes
    }
}
