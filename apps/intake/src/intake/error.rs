use thiserror::Error;

use crate::intake::session::SessionStatus;

/// Everything the intake workflow can refuse or fail with.
///
/// None of these is fatal: each leaves the session in a state with a path back to `Idle`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IntakeError {
    #[error("Please upload a valid PDF file.")]
    InvalidInputType { content_type: String },

    #[error("Upload failed: {0}")]
    Transport(String),

    /// The transport succeeded but the body could not be flattened.
    /// Surfaced to the user exactly like a transport failure.
    #[error("Upload failed: {0}")]
    Parse(String),

    #[error("Cannot {action} while the session is {status}")]
    InvalidTransition {
        action: &'static str,
        status: SessionStatus,
    },

    #[error("No field at path '{0}'")]
    UnknownField(String),

    #[error("Could not prepare document preview: {0}")]
    Preview(String),

    #[error("Intake session is closed")]
    SessionClosed,
}
