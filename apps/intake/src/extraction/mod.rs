//! Reference extraction endpoint.
//!
//! Stands in for the external parsing service during local runs: accepts the
//! same multipart upload the intake transport sends and answers with the raw
//! text of the PDF. Point `PARSER_ENDPOINT` at `/api/upload` to drive the whole
//! intake loop without another service.

use axum::{extract::Multipart, Json};
use serde::Serialize;
use tracing::warn;

use crate::errors::AppError;
use crate::intake::document::ACCEPTED_CONTENT_TYPE;
use crate::intake::handlers::read_document;

const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub filename: String,
    pub content_type: String,
    pub raw_text_preview: String,
    pub full_text_length: usize,
    pub full_text: String,
}

/// POST /api/upload
pub async fn handle_extract(multipart: Multipart) -> Result<Json<ExtractResponse>, AppError> {
    let document = read_document(multipart).await?;

    if document.content_type != ACCEPTED_CONTENT_TYPE {
        return Err(AppError::Validation(
            "Invalid file type. Only PDF is supported for now.".to_string(),
        ));
    }

    // pdf parsing is CPU-bound; keep it off the async workers.
    let bytes = document.bytes.clone();
    let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| format!("extraction task failed: {e}"))
        .and_then(|r| r.map_err(|e| e.to_string()));

    let text = match extracted {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => return Err(no_text()),
        Err(e) => {
            warn!(file = %document.name, "Error parsing PDF: {e}");
            return Err(no_text());
        }
    };

    Ok(Json(ExtractResponse {
        filename: document.name,
        content_type: document.content_type,
        raw_text_preview: text_preview(&text),
        full_text_length: text.chars().count(),
        full_text: text,
    }))
}

fn no_text() -> AppError {
    AppError::Validation("Could not extract text from this PDF.".to_string())
}

fn text_preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{head}...")
}
