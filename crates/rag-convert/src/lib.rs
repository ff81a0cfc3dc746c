//! rag-convert: turn uploaded documents into RAG-ready JSON
//!
//! PDFs become a list of page units, EPUBs a list of chapter units, and
//! spreadsheets (XLSX), Stata files (DTA) and CSV files a tabular record set.
//! Conversion runs through a request-scoped staging directory that is always
//! cleaned up. The crate ships an HTTP upload server and a command-line tool.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod server;
pub mod staging;
pub mod types;

pub use config::ConverterConfig;
pub use error::{Error, Result};
pub use ingestion::Dispatcher;
pub use processing::{ConversionService, ConvertedFile};
pub use types::{
    artifact::{CellValue, ConversionArtifact, ExtractionUnit, TabularResult},
    document::{DocumentFormat, FileDetails, UploadedDocument},
};
