//! Conversion endpoints

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::processing::ConvertedFile;
use crate::server::state::AppState;
use crate::types::{ConversionArtifact, FileDetails, UploadedDocument};

/// Multipart field carrying the upload
const FILE_FIELD: &str = "file";

/// Preview envelope: upload details alongside the converted result
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub file: FileDetails,
    pub output_filename: String,
    pub result: ConversionArtifact,
}

/// POST /api/convert - Convert an upload and return the JSON as a download
pub async fn convert_file(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let converted = run_conversion(&state, multipart).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, converted.json.len())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&converted.output_filename),
        )
        .body(Body::from(converted.json))
        .map_err(|e| Error::internal(e.to_string()))
}

/// POST /api/convert/preview - Convert an upload and return details plus result
pub async fn preview_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PreviewResponse>> {
    let converted = run_conversion(&state, multipart).await?;

    Ok(Json(PreviewResponse {
        file: converted.details,
        output_filename: converted.output_filename,
        result: converted.artifact,
    }))
}

async fn run_conversion(state: &AppState, multipart: Multipart) -> Result<ConvertedFile> {
    let document = read_upload(multipart).await?;
    let service = state.service();
    // Extraction is CPU-bound and blocking
    tokio::task::spawn_blocking(move || service.convert(document)).await?
}

/// Take the `file` field of the multipart body
async fn read_upload(mut multipart: Multipart) -> Result<UploadedDocument> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| Error::InvalidUpload("file field has no filename".to_string()))?;
        let content_type = field.content_type().map(|s| s.to_string());
        let data = field.bytes().await.map_err(multipart_error)?;

        tracing::info!("Received upload: {} ({} bytes)", filename, data.len());
        return Ok(UploadedDocument::new(&filename, content_type.as_deref(), data));
    }

    Err(Error::InvalidUpload(format!(
        "multipart body has no '{}' field",
        FILE_FIELD
    )))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::UploadTooLarge(err.body_text())
    } else {
        Error::InvalidUpload(err.body_text())
    }
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 UTF-8 name
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}
