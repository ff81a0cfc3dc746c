//! API routes for the converter server

pub mod convert;

use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};

use crate::server::state::AppState;
use crate::types::DocumentFormat;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Conversion - with larger body limit for file uploads
        .route(
            "/convert",
            post(convert::convert_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route(
            "/convert/preview",
            post(convert::preview_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    let formats: Vec<_> = DocumentFormat::ALL
        .iter()
        .map(|f| {
            serde_json::json!({
                "extension": f.extension(),
                "name": f.display_name(),
                "output": if f.is_tabular() { "table" } else { "units" },
            })
        })
        .collect();

    axum::Json(serde_json::json!({
        "name": "rag-convert",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Convert documents into RAG-ready JSON",
        "endpoints": {
            "GET /": "Upload page",
            "POST /api/convert": "Convert an upload (multipart field 'file') and download the JSON",
            "POST /api/convert/preview": "Convert an upload and return file details with the result",
            "GET /api/info": "This document",
            "GET /health": "Health check"
        },
        "formats": formats
    }))
}
