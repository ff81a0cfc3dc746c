//! Uploaded document and format types

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported input formats
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// PDF document, one unit per page
    Pdf,
    /// EPUB ebook, one unit per document item
    Epub,
    /// Excel spreadsheet (.xlsx)
    Xlsx,
    /// Stata data file (.dta)
    Dta,
    /// Comma-separated values
    Csv,
}

impl DocumentFormat {
    /// All supported formats, in the order they are advertised
    pub const ALL: [DocumentFormat; 5] = [
        DocumentFormat::Pdf,
        DocumentFormat::Epub,
        DocumentFormat::Xlsx,
        DocumentFormat::Dta,
        DocumentFormat::Csv,
    ];

    /// Detect format from extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "epub" => Some(Self::Epub),
            "xlsx" => Some(Self::Xlsx),
            "dta" => Some(Self::Dta),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Epub => "epub",
            Self::Xlsx => "xlsx",
            Self::Dta => "dta",
            Self::Csv => "csv",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Epub => "EPUB eBook",
            Self::Xlsx => "Excel Spreadsheet (.xlsx)",
            Self::Dta => "Stata Data (.dta)",
            Self::Csv => "CSV",
        }
    }

    /// Whether this format produces a tabular record set
    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::Xlsx | Self::Dta | Self::Csv)
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lowercase suffix of a filename after its last `.`, if it has one
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
}

/// A file submitted by a client
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// Declared filename, reduced to its final path component
    pub filename: String,
    /// Declared MIME type
    pub content_type: String,
    /// Raw file content
    pub data: Bytes,
}

impl UploadedDocument {
    /// Create an upload, guessing the MIME type from the filename when none was declared
    pub fn new(filename: &str, content_type: Option<&str>, data: impl Into<Bytes>) -> Self {
        let filename = sanitize_filename(filename);
        let content_type = match content_type {
            Some(ct) if !ct.trim().is_empty() => ct.to_string(),
            _ => mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };

        Self {
            filename,
            content_type,
            data: data.into(),
        }
    }

    /// Size of the upload in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Metadata shown to the user before conversion
    pub fn details(&self) -> FileDetails {
        FileDetails {
            filename: self.filename.clone(),
            filetype: self.content_type.clone(),
            filesize: self.size(),
        }
    }
}

/// Upload metadata as displayed by the interaction shell
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDetails {
    pub filename: String,
    pub filetype: String,
    pub filesize: u64,
}

/// Keep only the final path component so uploads cannot escape the staging directory
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" | "." | ".." => "upload".to_string(),
        name => Path::new(name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string()),
    }
}
