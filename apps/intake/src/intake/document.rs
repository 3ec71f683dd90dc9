use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::intake::error::IntakeError;

/// The only document type the intake accepts.
pub const ACCEPTED_CONTENT_TYPE: &str = "application/pdf";

/// A document handed over by the presentation layer, by drop or by manual selection.
#[derive(Clone)]
pub struct DocumentFile {
    pub name: String,
    /// MIME type as declared by the client. The content itself is never sniffed.
    pub content_type: String,
    pub bytes: Bytes,
}

impl std::fmt::Debug for DocumentFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

impl DocumentFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Size in megabytes, rounded to two decimals for display.
    pub fn size_mb(&self) -> f64 {
        (self.size_bytes() as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes(),
            size_mb: self.size_mb(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub size_mb: f64,
}

/// Same check for every acquisition path.
pub fn validate_document(file: &DocumentFile) -> Result<(), IntakeError> {
    let declared = file
        .content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();

    if declared.eq_ignore_ascii_case(ACCEPTED_CONTENT_TYPE) {
        Ok(())
    } else {
        Err(IntakeError::InvalidInputType {
            content_type: file.content_type.clone(),
        })
    }
}

/// Exclusively owned copy of the selected document, served back for side-by-side preview.
///
/// Created when a file is acquired and released on every path that clears the file.
/// Dropping the handle also removes the backing temp file.
#[derive(Debug)]
pub struct PreviewHandle {
    file: NamedTempFile,
}

impl PreviewHandle {
    pub fn acquire(document: &DocumentFile) -> Result<Self, IntakeError> {
        let mut file = tempfile::Builder::new()
            .prefix("intake-preview-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| IntakeError::Preview(e.to_string()))?;

        file.write_all(&document.bytes)
            .and_then(|_| file.flush())
            .map_err(|e| IntakeError::Preview(e.to_string()))?;

        debug!(path = %file.path().display(), "Preview acquired");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn release(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Preview released"),
            Err(e) => warn!(path = %path.display(), "Failed to remove preview file: {e}"),
        }
    }
}
