//! Format dispatch: filename extension -> extractor + normalizer pipeline

use std::path::Path;
use std::time::Duration;

use super::{
    normalize_chapters, normalize_pages, normalize_table, CsvTable, EpubReader, PdfPages,
    StataTable, XlsxTable,
};
use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::types::{file_extension, ConversionArtifact, DocumentFormat, UploadedDocument};

/// Routes a document to the pipeline for its format
#[derive(Debug, Clone)]
pub struct Dispatcher {
    pdf_timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl Dispatcher {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            pdf_timeout: Duration::from_secs(config.pdf_timeout_secs),
        }
    }

    /// Format of a declared filename, from the suffix after its last `.`
    pub fn detect(filename: &str) -> Result<DocumentFormat> {
        let extension = file_extension(filename).unwrap_or_default();
        DocumentFormat::from_extension(&extension).ok_or_else(|| {
            if extension.is_empty() {
                Error::unsupported(format!("'{}' has no file extension", filename))
            } else {
                Error::unsupported(format!(".{} ({})", extension, filename))
            }
        })
    }

    /// Convert an in-memory upload
    pub fn dispatch(&self, document: &UploadedDocument) -> Result<ConversionArtifact> {
        let format = Self::detect(&document.filename)?;
        self.run(format, &document.filename, &document.data)
    }

    /// Convert a staged file. The format is checked before the file is read.
    pub fn dispatch_file(&self, filename: &str, path: &Path) -> Result<ConversionArtifact> {
        let format = Self::detect(filename)?;
        let data = std::fs::read(path)?;
        self.run(format, filename, &data)
    }

    fn run(&self, format: DocumentFormat, filename: &str, data: &[u8]) -> Result<ConversionArtifact> {
        tracing::debug!("Dispatching {} as {}", filename, format.display_name());

        let artifact = match format {
            DocumentFormat::Pdf => {
                let pages = PdfPages::from_bytes(filename, data, self.pdf_timeout)?;
                ConversionArtifact::Units(normalize_pages(&pages))
            }
            DocumentFormat::Epub => {
                let mut reader = EpubReader::from_bytes(filename, data)?;
                ConversionArtifact::Units(normalize_chapters(&mut reader)?)
            }
            DocumentFormat::Xlsx => {
                let mut table = XlsxTable::from_bytes(filename, data)?;
                ConversionArtifact::Table(normalize_table(filename, &mut table)?)
            }
            DocumentFormat::Dta => {
                let mut table = StataTable::from_bytes(filename, data);
                ConversionArtifact::Table(normalize_table(filename, &mut table)?)
            }
            DocumentFormat::Csv => {
                let mut table = CsvTable::from_bytes(filename, data);
                ConversionArtifact::Table(normalize_table(filename, &mut table)?)
            }
        };

        tracing::debug!("{} produced {} units/rows", filename, artifact.len());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::epub::fixtures::{epub_with_items, xhtml};
    use crate::ingestion::pdf::fixtures::pdf_with_pages;
    use crate::ingestion::stata::fixtures::{dta_114, Col};
    use serde_json::json;

    fn upload(name: &str, data: Vec<u8>) -> UploadedDocument {
        UploadedDocument::new(name, None, data)
    }

    #[test]
    fn test_detect() {
        assert_eq!(Dispatcher::detect("report.PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(Dispatcher::detect("my.book.epub").unwrap(), DocumentFormat::Epub);
        assert_eq!(Dispatcher::detect("survey.dta").unwrap(), DocumentFormat::Dta);
        assert!(matches!(
            Dispatcher::detect("notes.txt"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            Dispatcher::detect("Makefile"),
            Err(Error::UnsupportedFormat(_))
        ));
        // The suffix must follow the last dot
        assert!(Dispatcher::detect("data.csv.bak").is_err());
    }

    #[test]
    fn test_dispatch_csv() {
        let artifact = Dispatcher::default()
            .dispatch(&upload("t.csv", b"a,b\n1,2\n3,4\n".to_vec()))
            .unwrap();
        assert_eq!(
            serde_json::to_value(&artifact).unwrap(),
            json!({
                "columns": ["a", "b"],
                "row_count": 2,
                "data": [{"a": 1, "b": 2}, {"a": 3, "b": 4}]
            })
        );
    }

    #[test]
    fn test_dispatch_pdf_skips_empty_page() {
        let data = pdf_with_pages(&[Some("One"), None, Some("Three")]);
        let artifact = Dispatcher::default().dispatch(&upload("three.pdf", data)).unwrap();

        let value = serde_json::to_value(&artifact).unwrap();
        let numbers: Vec<u64> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["page_number"].as_u64().unwrap())
            .collect();
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn test_dispatch_epub() {
        let body = xhtml("Intro", "<p>Halo dunia</p>");
        let data = epub_with_items(&[("intro.xhtml", "application/xhtml+xml", body.as_str())]);
        let artifact = Dispatcher::default().dispatch(&upload("book.epub", data)).unwrap();

        let value = serde_json::to_value(&artifact).unwrap();
        assert_eq!(value[0]["chapter"], "intro.xhtml");
        assert!(value[0]["content"].as_str().unwrap().contains("Halo dunia"));
    }

    #[test]
    fn test_dispatch_dta() {
        let data = dta_114(&[Col::Str("kota", 6, vec!["Solo"])]);
        let artifact = Dispatcher::default().dispatch(&upload("kota.dta", data)).unwrap();
        assert_eq!(
            serde_json::to_value(&artifact).unwrap(),
            json!({"columns": ["kota"], "row_count": 1, "data": [{"kota": "Solo"}]})
        );
    }

    #[test]
    fn test_dispatch_unsupported_never_reads_file() {
        let missing = Path::new("/nonexistent/notes.txt");
        let err = Dispatcher::default().dispatch_file("notes.txt", missing).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_dispatch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged-t.csv");
        std::fs::write(&path, "x\nhello\n").unwrap();

        let artifact = Dispatcher::default().dispatch_file("t.csv", &path).unwrap();
        assert_eq!(artifact.len(), 1);
    }

    #[test]
    fn test_corrupt_xlsx_is_extraction_failure() {
        let err = Dispatcher::default()
            .dispatch(&upload("sheet.xlsx", b"PK not really".to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }
}
