//! Configuration for the document converter

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_PATH_ENV: &str = "RAG_CONVERT_CONFIG";

/// Main converter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Staging (working directory) configuration
    pub staging: StagingConfig,
    /// Extractor configuration
    pub extraction: ExtractionConfig,
}

impl ConverterConfig {
    /// Load configuration from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Build configuration from the environment.
    ///
    /// Reads the file named by `RAG_CONVERT_CONFIG` if set, then applies
    /// `RAG_CONVERT_HOST`, `RAG_CONVERT_PORT` and `RAG_CONVERT_WORK_DIR`.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("RAG_CONVERT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("RAG_CONVERT_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid RAG_CONVERT_PORT '{}': {}", port, e)))?;
        }
        if let Some(dir) = lookup("RAG_CONVERT_WORK_DIR") {
            self.staging.work_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Working directory holding per-request staging directories
    pub work_dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("temp_uploaded_file"),
        }
    }
}

/// Extractor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Upper bound for the primary PDF text extractor before falling back (seconds)
    pub pdf_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdf_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ConverterConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.staging.work_dir, PathBuf::from("temp_uploaded_file"));
        assert_eq!(config.extraction.pdf_timeout_secs, 60);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convert.toml");
        std::fs::write(&path, "[server]\nport = 9000\n\n[staging]\nwork_dir = \"/tmp/stage\"\n")
            .unwrap();

        let config = ConverterConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.staging.work_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(config.extraction.pdf_timeout_secs, 60);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(ConverterConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("RAG_CONVERT_HOST", "127.0.0.1"),
            ("RAG_CONVERT_PORT", "3000"),
            ("RAG_CONVERT_WORK_DIR", "scratch"),
        ]
        .into_iter()
        .collect();

        let mut config = ConverterConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.staging.work_dir, PathBuf::from("scratch"));

        let bad = |key: &str| (key == "RAG_CONVERT_PORT").then(|| "eighty".to_string());
        assert!(ConverterConfig::default().apply_overrides(bad).is_err());
    }
}
