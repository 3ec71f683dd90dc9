//! Axum route handlers for the Intake API.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::intake::controller::IntakeHandle;
use crate::intake::document::DocumentFile;
use crate::intake::review::{build_review, ReviewView};
use crate::intake::session::{SessionSnapshot, SessionStatus};
use crate::intake::transport::UPLOAD_FIELD;
use crate::intake::IntakeError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EditFieldRequest {
    pub path: String,
    pub value: String,
}

/// Reads the `file` part of a multipart body into a document.
pub async fn read_document(mut multipart: Multipart) -> Result<DocumentFile, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("document").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Could not read uploaded file", e))?;
        return Ok(DocumentFile::new(name, content_type, bytes));
    }
    Err(AppError::Validation(format!(
        "Multipart field '{UPLOAD_FIELD}' is required"
    )))
}

fn multipart_error(context: &str, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Uploaded file exceeds the configured size limit".to_string())
    } else {
        AppError::Validation(format!("{context}: {e}"))
    }
}

async fn find_session(state: &AppState, id: Uuid) -> Result<IntakeHandle, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Intake session {id} not found")))
}

/// POST /api/v1/intake/sessions
pub async fn handle_open_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let handle = state.sessions.open().await;
    Ok((StatusCode::CREATED, Json(handle.snapshot().await?)))
}

/// GET /api/v1/intake/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let handle = find_session(&state, id).await?;
    Ok(Json(handle.snapshot().await?))
}

/// DELETE /api/v1/intake/sessions/:id
pub async fn handle_close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.close(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Intake session {id} not found")))
    }
}

/// POST /api/v1/intake/sessions/:id/file
///
/// Drag-and-drop and manual selection both post here. A wrong document type is not
/// an HTTP error: the session moves to Idle and the snapshot carries the message.
pub async fn handle_select_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<SessionSnapshot>, AppError> {
    let handle = find_session(&state, id).await?;
    let document = read_document(multipart).await?;
    Ok(Json(handle.select_file(document).await?))
}

/// DELETE /api/v1/intake/sessions/:id/file
pub async fn handle_remove_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let handle = find_session(&state, id).await?;
    Ok(Json(handle.remove_file().await?))
}

/// POST /api/v1/intake/sessions/:id/upload
///
/// Returns immediately with the session in Uploading; poll the session for progress.
pub async fn handle_start_upload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let handle = find_session(&state, id).await?;
    Ok((StatusCode::ACCEPTED, Json(handle.start_upload().await?)))
}

/// PATCH /api/v1/intake/sessions/:id/fields
pub async fn handle_edit_field(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EditFieldRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let handle = find_session(&state, id).await?;
    Ok(Json(handle.edit_field(req.path, req.value).await?))
}

/// POST /api/v1/intake/sessions/:id/confirm
pub async fn handle_confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let handle = find_session(&state, id).await?;
    Ok(Json(handle.confirm().await?))
}

/// POST /api/v1/intake/sessions/:id/reset
pub async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let handle = find_session(&state, id).await?;
    Ok(Json(handle.reset().await?))
}

/// GET /api/v1/intake/sessions/:id/preview
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let handle = find_session(&state, id).await?;
    let preview = handle
        .preview()
        .await?
        .ok_or_else(|| AppError::NotFound("No document selected".to_string()))?;

    // The session may release the preview between the lookup and the read.
    let bytes = tokio::fs::read(&preview.path)
        .await
        .map_err(|_| AppError::NotFound("No document selected".to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, preview.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", preview.name.replace('"', "")),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/v1/intake/sessions/:id/review
pub async fn handle_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewView>, AppError> {
    let handle = find_session(&state, id).await?;
    let snapshot = handle.snapshot().await?;
    if !matches!(
        snapshot.status,
        SessionStatus::Reviewing | SessionStatus::Confirmed
    ) {
        return Err(IntakeError::InvalidTransition {
            action: "review fields",
            status: snapshot.status,
        }
        .into());
    }
    Ok(Json(build_review(&snapshot.records)))
}
