//! One-file conversion: stage, dispatch, finalize, release

mod service;

pub use service::{ConversionService, ConvertedFile};
