//! Upload transport: the single request to the external parsing service.
//!
//! `IntakeController` holds an `Arc<dyn UploadTransport>`, so tests and
//! alternative services swap in without touching the workflow.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::intake::document::DocumentFile;
use crate::intake::error::IntakeError;

/// Multipart field the parsing service reads the document from.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parser responded with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("parser response is not JSON: {0}")]
    InvalidBody(String),
}

impl From<TransportError> for IntakeError {
    fn from(e: TransportError) -> Self {
        IntakeError::Transport(e.to_string())
    }
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Sends the document and returns the decoded JSON body of a 2xx response.
    /// Non-2xx responses and network faults are both errors.
    async fn upload(&self, file: DocumentFile) -> Result<Value, TransportError>;
}

/// Posts the document as multipart form data to a configured endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn upload(&self, file: DocumentFile) -> Result<Value, TransportError> {
        let size = file.size_bytes();
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name)
            .mime_str(&file.content_type)?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Parser at {} returned {}: {}", self.endpoint, status, body);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        debug!(
            "Parser responded {} ({} bytes) for a {} byte upload",
            status,
            body.len(),
            size
        );
        serde_json::from_slice(&body).map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Multipart,
        http::StatusCode,
        routing::post,
        Json, Router,
    };
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api/upload")
    }

    async fn echo_fields(mut multipart: Multipart) -> Json<Value> {
        let mut out = json!({});
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
            out[name] = json!({"file_name": file_name, "content_type": content_type, "len": len});
        }
        Json(out)
    }

    fn pdf() -> DocumentFile {
        DocumentFile::new("resume.pdf", "application/pdf", b"%PDF-1.4 body".to_vec())
    }

    fn transport(endpoint: String) -> HttpTransport {
        HttpTransport::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_sends_document_under_file_field() {
        let endpoint = serve(Router::new().route("/api/upload", post(echo_fields))).await;
        let body = transport(endpoint).upload(pdf()).await.unwrap();

        assert_eq!(body["file"]["file_name"], "resume.pdf");
        assert_eq!(body["file"]["content_type"], "application/pdf");
        assert_eq!(body["file"]["len"], 13);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let router = Router::new().route(
            "/api/upload",
            post(|| async { (StatusCode::BAD_REQUEST, "Could not extract text") }),
        );
        let endpoint = serve(router).await;
        let err = transport(endpoint).upload(pdf()).await.unwrap_err();

        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "Could not extract text");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_json_success_is_error() {
        let router = Router::new().route("/api/upload", post(|| async { "plain text" }));
        let endpoint = serve(router).await;
        let err = transport(endpoint).upload(pdf()).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = transport(format!("http://{addr}/api/upload"))
            .upload(pdf())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }

    #[test]
    fn test_folds_into_intake_transport_error() {
        let err: IntakeError = TransportError::Status {
            status: 502,
            body: String::new(),
        }
        .into();
        assert_eq!(
            err,
            IntakeError::Transport("parser responded with HTTP 502".to_string())
        );
        assert_eq!(err.to_string(), "Upload failed: parser responded with HTTP 502");
    }
}
