//! Conversion service used by the HTTP handlers and the CLI

use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::config::ConverterConfig;
use crate::error::Result;
use crate::ingestion::Dispatcher;
use crate::staging::{output_filename, StagingArea, StagingStore};
use crate::types::{ConversionArtifact, FileDetails, UploadedDocument};

/// Result of a successful conversion
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    /// Metadata of the upload
    pub details: FileDetails,
    /// `rag_ready_<original_filename>.json`
    pub output_filename: String,
    /// Normalized artifact
    pub artifact: ConversionArtifact,
    /// Finalized JSON exactly as written to the staging area
    pub json: Vec<u8>,
}

/// Converts uploads one at a time; holds no per-request state
#[derive(Debug, Clone)]
pub struct ConversionService {
    dispatcher: Dispatcher,
    staging: StagingStore,
}

impl ConversionService {
    /// Create the service, preparing the working directory
    pub fn new(config: &ConverterConfig) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::new(&config.extraction),
            staging: StagingStore::new(&config.staging.work_dir)?,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.staging.work_dir()
    }

    /// Convert one upload. The staging area is released on every exit path.
    pub fn convert(&self, document: UploadedDocument) -> Result<ConvertedFile> {
        let start = Instant::now();
        tracing::info!(
            "Converting {} ({} bytes, {})",
            document.filename,
            document.size(),
            document.content_type
        );

        let area = self.staging.begin()?;
        let result = self.run(&area, &document);
        let released = area.release();

        match result {
            Ok(converted) => {
                released?;
                tracing::info!(
                    "Converted {} -> {} ({} units/rows) in {:.2}s",
                    converted.details.filename,
                    converted.output_filename,
                    converted.artifact.len(),
                    start.elapsed().as_secs_f64()
                );
                Ok(converted)
            }
            Err(e) => {
                if let Err(release_err) = released {
                    tracing::warn!("Failed to release staging area: {}", release_err);
                }
                tracing::warn!("Conversion of {} failed: {}", document.filename, e);
                Err(e)
            }
        }
    }

    fn run(&self, area: &StagingArea, document: &UploadedDocument) -> Result<ConvertedFile> {
        let input = area.stage(document)?;
        let artifact = self.dispatcher.dispatch_file(&document.filename, &input)?;
        let output = area.finalize(&artifact, &document.filename)?;
        let json = fs::read(&output)?;

        Ok(ConvertedFile {
            details: document.details(),
            output_filename: output_filename(&document.filename),
            artifact,
            json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ingestion::fixtures::{epub_with_items, pdf_with_pages, xhtml};

    fn service(work_dir: &Path) -> ConversionService {
        let mut config = ConverterConfig::default();
        config.staging.work_dir = work_dir.to_path_buf();
        ConversionService::new(&config).unwrap()
    }

    fn work_dir_is_empty(dir: &Path) -> bool {
        fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_convert_csv() {
        let root = tempfile::tempdir().unwrap();
        let service = service(root.path());

        let converted = service
            .convert(UploadedDocument::new("t.csv", None, b"a,b\n1,2\n3,4\n".to_vec()))
            .unwrap();
        assert_eq!(converted.output_filename, "rag_ready_t.csv.json");
        assert_eq!(converted.details.filesize, 12);

        let value: serde_json::Value = serde_json::from_slice(&converted.json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "columns": ["a", "b"],
                "row_count": 2,
                "data": [{"a": 1, "b": 2}, {"a": 3, "b": 4}]
            })
        );
        assert!(work_dir_is_empty(root.path()));
    }

    #[test]
    fn test_convert_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let service = service(root.path());
        let data = pdf_with_pages(&[Some("Satu"), None, Some("Tiga")]);

        let first = service
            .convert(UploadedDocument::new("doc.pdf", None, data.clone()))
            .unwrap();
        let second = service
            .convert(UploadedDocument::new("doc.pdf", None, data))
            .unwrap();
        assert_eq!(first.json, second.json);
        assert_eq!(first.artifact.len(), 2);
    }

    #[test]
    fn test_non_ascii_is_not_escaped() {
        let root = tempfile::tempdir().unwrap();
        let service = service(root.path());
        let body = xhtml("Bab", "<p>Ça va — 日本語</p>");
        let data = epub_with_items(&[("bab.xhtml", "application/xhtml+xml", body.as_str())]);

        let converted = service
            .convert(UploadedDocument::new("buku.epub", None, data))
            .unwrap();
        let json = String::from_utf8(converted.json).unwrap();
        assert!(json.contains("Ça va — 日本語"));
        assert!(!json.contains("\\u"));
    }

    #[test]
    fn test_unsupported_format_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let service = service(root.path());

        let err = service
            .convert(UploadedDocument::new("notes.txt", None, b"hello".to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(work_dir_is_empty(root.path()));
    }

    #[test]
    fn test_extraction_failure_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let service = service(root.path());

        let err = service
            .convert(UploadedDocument::new("broken.pdf", None, b"garbage".to_vec()))
            .unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert!(work_dir_is_empty(root.path()));
    }
}
