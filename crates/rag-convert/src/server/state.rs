//! Application state for the converter server

use std::sync::Arc;

use crate::config::ConverterConfig;
use crate::error::Result;
use crate::processing::ConversionService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ConverterConfig,
    /// Conversion pipeline; conversions share no mutable state
    service: Arc<ConversionService>,
}

impl AppState {
    /// Create new application state, preparing the working directory
    pub fn new(config: ConverterConfig) -> Result<Self> {
        let service = Arc::new(ConversionService::new(&config)?);
        tracing::info!(
            "Conversion service ready (working directory: {})",
            service.work_dir().display()
        );

        Ok(Self {
            inner: Arc::new(AppStateInner { config, service }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &ConverterConfig {
        &self.inner.config
    }

    /// Handle to the conversion service, movable onto a blocking thread
    pub fn service(&self) -> Arc<ConversionService> {
        Arc::clone(&self.inner.service)
    }
}
