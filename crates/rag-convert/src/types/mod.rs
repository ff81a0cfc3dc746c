//! Core types for the converter

pub mod artifact;
pub mod document;

pub use artifact::{CellValue, ChapterUnit, ConversionArtifact, ExtractionUnit, PageUnit, TabularResult};
pub use document::{file_extension, DocumentFormat, FileDetails, UploadedDocument};
