//! On-disk lifecycle of uploads and produced artifacts
//!
//! Every request stages into its own directory under the working directory.
//! The directory is removed when the [`StagingArea`] is released or dropped,
//! whichever comes first.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ConversionArtifact, UploadedDocument};

/// Prefix of every finalized artifact filename
pub const OUTPUT_PREFIX: &str = "rag_ready_";

/// Longest single path component common filesystems accept, in bytes
const MAX_FILENAME_BYTES: usize = 255;

/// Artifact filename for an upload: `rag_ready_<original_filename>.json`
pub fn output_filename(original_filename: &str) -> String {
    format!("{}{}.json", OUTPUT_PREFIX, original_filename)
}

/// Working directory shared by all requests
#[derive(Debug, Clone)]
pub struct StagingStore {
    work_dir: PathBuf,
}

impl StagingStore {
    /// Create the working directory if it does not exist yet
    pub fn new(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = work_dir.into();
        fs::create_dir_all(&work_dir)?;
        tracing::debug!("Working directory ready: {}", work_dir.display());
        Ok(Self { work_dir })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Acquire a fresh request directory
    pub fn begin(&self) -> Result<StagingArea> {
        let request_id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("request-{}-", request_id.simple()))
            .tempdir_in(&self.work_dir)?;
        tracing::debug!("Request {} staging in {}", request_id, dir.path().display());
        Ok(StagingArea { request_id, dir })
    }
}

/// Request-scoped staging directory
#[derive(Debug)]
pub struct StagingArea {
    request_id: Uuid,
    dir: TempDir,
}

impl StagingArea {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the uploaded bytes under their original filename.
    ///
    /// Names whose artifact filename would not fit on disk are rejected here,
    /// before anything is written.
    pub fn stage(&self, document: &UploadedDocument) -> Result<PathBuf> {
        let output_len = output_filename(&document.filename).len();
        if output_len > MAX_FILENAME_BYTES {
            return Err(Error::InvalidUpload(format!(
                "filename is too long: {} bytes, at most {} allowed",
                document.filename.len(),
                MAX_FILENAME_BYTES - (output_len - document.filename.len())
            )));
        }
        let path = self.dir.path().join(&document.filename);
        fs::write(&path, &document.data)?;
        tracing::debug!("Staged {} ({} bytes)", path.display(), document.size());
        Ok(path)
    }

    /// Serialize the artifact next to the staged input and return its path
    pub fn finalize(&self, artifact: &ConversionArtifact, original_filename: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(output_filename(original_filename));
        fs::write(&path, artifact.to_json_pretty()?)?;
        tracing::debug!("Finalized {}", path.display());
        Ok(path)
    }

    /// Delete the request directory and everything staged in it
    pub fn release(self) -> Result<()> {
        let request_id = self.request_id;
        self.dir.close()?;
        tracing::debug!("Request {} staging released", request_id);
        Ok(())
    }
}
