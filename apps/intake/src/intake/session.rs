//! Upload session: the state owned by one intake controller.
//!
//! Every transition consumes the session and hands back the next one, so the
//! state machine can be driven and tested without any task, timer or transport.
//! Refused triggers return the untouched session inside `Refused`.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::intake::document::{validate_document, DocumentFile, FileSummary, PreviewHandle};
use crate::intake::error::IntakeError;
use crate::intake::progress::PROGRESS_CAP;
use crate::normalize::{normalize_document, RecordSet};

const PROGRESS_DONE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    FileSelected,
    Uploading,
    Error,
    Reviewing,
    Confirmed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::FileSelected => "file_selected",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Error => "error",
            SessionStatus::Reviewing => "reviewing",
            SessionStatus::Confirmed => "confirmed",
        };
        f.write_str(s)
    }
}

/// A document together with its preview. They only ever exist as a pair.
#[derive(Debug)]
struct Selection {
    file: DocumentFile,
    preview: PreviewHandle,
}

impl Selection {
    fn release(self) {
        self.preview.release();
    }
}

/// A trigger the current status does not accept. The session comes back unchanged.
#[derive(Debug)]
pub struct Refused {
    pub session: UploadSession,
    pub error: IntakeError,
}

pub type Transition = Result<UploadSession, Refused>;

#[derive(Debug)]
pub struct UploadSession {
    id: Uuid,
    selection: Option<Selection>,
    status: SessionStatus,
    progress: u8,
    records: RecordSet,
    error_message: Option<String>,
    /// Bumped on every upload start. Ticks and transport results carry it.
    attempt: u64,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Immutable view of a session, published after every handled event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub file: Option<FileSummary>,
    pub has_preview: bool,
    pub progress: u8,
    pub records: RecordSet,
    pub error_message: Option<String>,
}

impl UploadSession {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            selection: None,
            status: SessionStatus::Idle,
            progress: 0,
            records: RecordSet::new(),
            error_message: None,
            attempt: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn file(&self) -> Option<&DocumentFile> {
        self.selection.as_ref().map(|s| &s.file)
    }

    pub fn preview_path(&self) -> Option<&Path> {
        self.selection.as_ref().map(|s| s.preview.path())
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            status: self.status(),
            file: self.file().map(DocumentFile::summary),
            has_preview: self.preview_path().is_some(),
            progress: self.progress(),
            records: self.records().clone(),
            error_message: self.error_message().map(str::to_owned),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // File acquisition
    // ────────────────────────────────────────────────────────────────────────

    /// Idle/FileSelected → FileSelected for an accepted document, → Idle with an
    /// error message for a wrong type. Any previously selected document is released.
    /// A preview that cannot be written is a refusal; the session keeps its file.
    pub fn select_file(self, file: DocumentFile) -> Transition {
        self.select_file_with(file, PreviewHandle::acquire)
    }

    fn select_file_with<F>(mut self, file: DocumentFile, acquire: F) -> Transition
    where
        F: FnOnce(&DocumentFile) -> Result<PreviewHandle, IntakeError>,
    {
        if !matches!(self.status, SessionStatus::Idle | SessionStatus::FileSelected) {
            return self.refuse("select a file");
        }

        if let Err(e) = validate_document(&file) {
            debug!(session_id = %self.id, file = %file.name, "File rejected: {e}");
            self.release_selection();
            self.error_message = Some(e.to_string());
            return Ok(self.enter(SessionStatus::Idle));
        }

        let preview = match acquire(&file) {
            Ok(preview) => preview,
            Err(error) => return Err(Refused { session: self, error }),
        };

        self.release_selection();
        self.selection = Some(Selection { file, preview });
        self.error_message = None;
        Ok(self.enter(SessionStatus::FileSelected))
    }

    /// FileSelected/Error → Idle, releasing the document and its preview.
    pub fn remove_file(mut self) -> Transition {
        if !matches!(self.status, SessionStatus::FileSelected | SessionStatus::Error) {
            return self.refuse("remove the file");
        }
        self.release_selection();
        self.error_message = None;
        self.progress = 0;
        Ok(self.enter(SessionStatus::Idle))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Upload
    // ────────────────────────────────────────────────────────────────────────

    /// FileSelected/Error → Uploading. Also the retry path out of Error.
    pub fn start_upload(mut self) -> Transition {
        if !matches!(self.status, SessionStatus::FileSelected | SessionStatus::Error) {
            return self.refuse("start an upload");
        }
        self.attempt += 1;
        self.progress = 0;
        self.error_message = None;
        Ok(self.enter(SessionStatus::Uploading))
    }

    /// Applies a simulator tick. Ticks from another attempt, or arriving after the
    /// session left Uploading, are dropped.
    pub fn apply_tick(mut self, attempt: u64, progress: u8) -> Self {
        if !self.accepts_upload_event(attempt) {
            debug!(session_id = %self.id, attempt, "Discarding late progress tick");
            return self;
        }
        self.progress = self.progress.max(progress.min(PROGRESS_CAP));
        self
    }

    /// Resolves the in-flight upload. A JSON object body is normalized into the
    /// record set; anything else, or a transport error, lands in Error with the file kept.
    pub fn finish_upload(mut self, attempt: u64, outcome: Result<Value, IntakeError>) -> Self {
        if !self.accepts_upload_event(attempt) {
            debug!(session_id = %self.id, attempt, "Discarding stale upload result");
            return self;
        }

        let records = outcome.and_then(|body| {
            normalize_document(&body).map_err(|e| IntakeError::Parse(e.to_string()))
        });

        match records {
            Ok(records) => {
                self.records = records;
                self.progress = PROGRESS_DONE;
                self.enter(SessionStatus::Reviewing)
            }
            Err(e) => {
                self.error_message = Some(e.to_string());
                self.progress = 0;
                self.enter(SessionStatus::Error)
            }
        }
    }

    fn accepts_upload_event(&self, attempt: u64) -> bool {
        self.status == SessionStatus::Uploading && self.attempt == attempt
    }

    // ────────────────────────────────────────────────────────────────────────
    // Review
    // ────────────────────────────────────────────────────────────────────────

    /// Replaces one field's value and marks it fully certain. The record set is
    /// swapped wholesale; other fields are carried over as they were.
    pub fn edit_field(mut self, path: &str, value: &str) -> Transition {
        if self.status != SessionStatus::Reviewing {
            return self.refuse("edit a field");
        }
        match self.records.with_correction(path, value) {
            Some(records) => {
                self.records = records;
                Ok(self)
            }
            None => Err(Refused {
                error: IntakeError::UnknownField(path.to_string()),
                session: self,
            }),
        }
    }

    /// Reviewing → Confirmed. Returns the record set to hand to persistence.
    pub fn confirm(self) -> Result<(UploadSession, RecordSet), Refused> {
        if self.status != SessionStatus::Reviewing {
            return Err(self.refusal("confirm"));
        }
        let records = self.records.clone();
        Ok((self.enter(SessionStatus::Confirmed), records))
    }

    /// Back to a clean Idle session. Refused only while an upload is in flight.
    pub fn reset(mut self) -> Transition {
        if self.status == SessionStatus::Uploading {
            return self.refuse("reset");
        }
        self.release_selection();
        self.records = RecordSet::new();
        self.error_message = None;
        self.progress = 0;
        Ok(self.enter(SessionStatus::Idle))
    }

    /// Releases the preview. Used when the owning controller shuts down.
    pub fn close(mut self) {
        self.release_selection();
    }

    // ────────────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────────────

    fn release_selection(&mut self) {
        if let Some(selection) = self.selection.take() {
            selection.release();
        }
    }

    fn enter(mut self, to: SessionStatus) -> Self {
        debug!(session_id = %self.id, from = %self.status, to = %to, "Session transition");
        self.status = to;
        self
    }

    fn refusal(self, action: &'static str) -> Refused {
        Refused {
            error: IntakeError::InvalidTransition {
                action,
                status: self.status,
            },
            session: self,
        }
    }

    fn refuse(self, action: &'static str) -> Transition {
        Err(self.refusal(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::record::{DEFAULT_CONFIDENCE, MAX_CONFIDENCE};
    use serde_json::json;

    fn pdf() -> DocumentFile {
        DocumentFile::new("resume.pdf", "application/pdf", b"%PDF-1.4".to_vec())
    }

    fn selected() -> UploadSession {
        UploadSession::default().select_file(pdf()).unwrap()
    }

    fn uploading() -> UploadSession {
        selected().start_upload().unwrap()
    }

    fn reviewing() -> UploadSession {
        let session = uploading();
        let attempt = session.attempt();
        session.finish_upload(
            attempt,
            Ok(json!({
                "name": {"value": "Jane Doe", "confidence": 62},
                "skills": {"value": ["Go", "Rust"], "confidence": 88},
                "summary": "Experienced engineer"
            })),
        )
    }

    fn errored() -> UploadSession {
        let session = uploading();
        let attempt = session.attempt();
        session.finish_upload(attempt, Err(IntakeError::Transport("HTTP 500".to_string())))
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = UploadSession::default();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.file().is_none());
        assert!(session.records().is_empty());
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_valid_file_is_selected_with_preview() {
        let session = selected();
        assert_eq!(session.status(), SessionStatus::FileSelected);
        assert_eq!(session.file().unwrap().name, "resume.pdf");
        assert!(session.preview_path().unwrap().exists());
        assert!(session.error_message().is_none());
    }

    #[test]
    fn test_wrong_type_stays_idle_with_message() {
        let file = DocumentFile::new("cv.docx", "application/msword", b"doc".to_vec());
        let session = UploadSession::default().select_file(file).unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.file().is_none());
        assert!(session.preview_path().is_none());
        assert_eq!(session.error_message(), Some("Please upload a valid PDF file."));
    }

    #[test]
    fn test_valid_file_clears_prior_error() {
        let bad = DocumentFile::new("cv.png", "image/png", Vec::new());
        let session = UploadSession::default()
            .select_file(bad)
            .unwrap()
            .select_file(pdf())
            .unwrap();
        assert_eq!(session.status(), SessionStatus::FileSelected);
        assert!(session.error_message().is_none());
    }

    #[test]
    fn test_wrong_type_from_file_selected_releases_current_file() {
        let session = selected();
        let old_preview = session.preview_path().unwrap().to_path_buf();
        let bad = DocumentFile::new("cv.png", "image/png", Vec::new());

        let session = session.select_file(bad).unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.file().is_none());
        assert!(!old_preview.exists());
        assert!(session.error_message().is_some());
    }

    #[test]
    fn test_replacing_file_releases_old_preview() {
        let session = selected();
        let old_preview = session.preview_path().unwrap().to_path_buf();
        let replacement = DocumentFile::new("new.pdf", "application/pdf", b"%PDF-2".to_vec());

        let session = session.select_file(replacement).unwrap();
        assert_eq!(session.file().unwrap().name, "new.pdf");
        assert!(!old_preview.exists());
        assert!(session.preview_path().unwrap().exists());
    }

    #[test]
    fn test_preview_failure_is_refused_and_keeps_current_file() {
        let session = selected();
        let old_preview = session.preview_path().unwrap().to_path_buf();
        let replacement = DocumentFile::new("new.pdf", "application/pdf", b"%PDF-2".to_vec());

        let refused = session
            .select_file_with(replacement, |_| Err(IntakeError::Preview("disk full".to_string())))
            .unwrap_err();
        assert_eq!(refused.error, IntakeError::Preview("disk full".to_string()));
        assert_eq!(refused.session.status(), SessionStatus::FileSelected);
        assert_eq!(refused.session.file().unwrap().name, "resume.pdf");
        assert!(old_preview.exists());
    }

    #[test]
    fn test_remove_file_releases_preview() {
        let session = selected();
        let preview = session.preview_path().unwrap().to_path_buf();
        let session = session.remove_file().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.file().is_none());
        assert!(!preview.exists());
    }

    #[test]
    fn test_remove_file_refused_when_idle() {
        let refused = UploadSession::default().remove_file().unwrap_err();
        assert_eq!(refused.session.status(), SessionStatus::Idle);
        assert!(matches!(refused.error, IntakeError::InvalidTransition { .. }));
    }

    #[test]
    fn test_start_upload_resets_progress_and_bumps_attempt() {
        let session = uploading();
        assert_eq!(session.status(), SessionStatus::Uploading);
        assert_eq!(session.progress(), 0);
        assert_eq!(session.attempt(), 1);
    }

    #[test]
    fn test_start_upload_requires_a_file() {
        let refused = UploadSession::default().start_upload().unwrap_err();
        assert_eq!(
            refused.error,
            IntakeError::InvalidTransition {
                action: "start an upload",
                status: SessionStatus::Idle
            }
        );
    }

    #[test]
    fn test_second_upload_while_uploading_is_refused() {
        let refused = uploading().start_upload().unwrap_err();
        assert_eq!(refused.session.status(), SessionStatus::Uploading);
        assert_eq!(refused.session.attempt(), 1);
    }

    #[test]
    fn test_ticks_raise_progress_up_to_cap() {
        let session = uploading();
        let attempt = session.attempt();
        let session = session.apply_tick(attempt, 40);
        assert_eq!(session.progress(), 40);
        let session = session.apply_tick(attempt, 100);
        assert_eq!(session.progress(), PROGRESS_CAP);
    }

    #[test]
    fn test_ticks_never_lower_progress() {
        let session = uploading();
        let attempt = session.attempt();
        let session = session.apply_tick(attempt, 50).apply_tick(attempt, 20);
        assert_eq!(session.progress(), 50);
    }

    #[test]
    fn test_tick_for_other_attempt_is_ignored() {
        let session = uploading();
        let session = session.apply_tick(99, 30);
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_late_tick_after_review_is_ignored() {
        let session = reviewing();
        let attempt = session.attempt();
        let session = session.apply_tick(attempt, 30);
        assert_eq!(session.status(), SessionStatus::Reviewing);
        assert_eq!(session.progress(), 100);
    }

    #[test]
    fn test_success_populates_records_and_completes_progress() {
        let session = reviewing();
        assert_eq!(session.status(), SessionStatus::Reviewing);
        assert_eq!(session.progress(), 100);
        assert_eq!(session.records().len(), 3);
        assert_eq!(session.records().get("skills").unwrap().value, "Go, Rust");
        assert_eq!(
            session.records().get("summary").unwrap().confidence,
            DEFAULT_CONFIDENCE
        );
    }

    #[test]
    fn test_failure_keeps_file_for_retry() {
        let session = errored();
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.error_message(), Some("Upload failed: HTTP 500"));
        assert!(session.file().is_some());
        assert!(session.records().is_empty());
        assert_eq!(session.progress(), 0);
    }

    #[test]
    fn test_non_object_body_is_an_error() {
        let session = uploading();
        let attempt = session.attempt();
        let session = session.finish_upload(attempt, Ok(json!(["not", "a", "tree"])));
        assert_eq!(session.status(), SessionStatus::Error);
        assert!(session.error_message().unwrap().starts_with("Upload failed"));
    }

    #[test]
    fn test_retry_from_error_starts_new_attempt() {
        let session = errored().start_upload().unwrap();
        assert_eq!(session.status(), SessionStatus::Uploading);
        assert_eq!(session.attempt(), 2);
        assert!(session.error_message().is_none());
    }

    #[test]
    fn test_stale_result_from_previous_attempt_is_ignored() {
        let session = errored().start_upload().unwrap();
        let session = session.finish_upload(1, Ok(json!({"name": "stale"})));
        assert_eq!(session.status(), SessionStatus::Uploading);
        assert!(session.records().is_empty());
    }

    #[test]
    fn test_cancel_from_error_clears_file_and_error() {
        let session = errored();
        let preview = session.preview_path().unwrap().to_path_buf();
        let session = session.remove_file().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.error_message().is_none());
        assert!(!preview.exists());
    }

    #[test]
    fn test_edit_resets_confidence_and_leaves_others() {
        let session = reviewing();
        let before = session.records().clone();
        let session = session.edit_field("name", "Jane Smith").unwrap();

        let name = session.records().get("name").unwrap();
        assert_eq!(name.value, "Jane Smith");
        assert_eq!(name.confidence, MAX_CONFIDENCE);
        for path in ["skills", "summary"] {
            assert_eq!(session.records().get(path), before.get(path));
        }
        assert_eq!(session.status(), SessionStatus::Reviewing);
    }

    #[test]
    fn test_edit_of_high_confidence_field_still_resets_to_max() {
        let session = reviewing().edit_field("skills", "Go").unwrap();
        assert_eq!(session.records().get("skills").unwrap().confidence, MAX_CONFIDENCE);
    }

    #[test]
    fn test_edit_unknown_path_is_refused() {
        let refused = reviewing().edit_field("address", "x").unwrap_err();
        assert_eq!(refused.error, IntakeError::UnknownField("address".to_string()));
        assert_eq!(refused.session.records().len(), 3);
    }

    #[test]
    fn test_edit_outside_review_is_refused() {
        assert!(selected().edit_field("name", "x").is_err());
    }

    #[test]
    fn test_confirm_hands_over_records() {
        let (session, records) = reviewing()
            .edit_field("name", "Jane Smith")
            .unwrap()
            .confirm()
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Confirmed);
        assert_eq!(records.get("name").unwrap().value, "Jane Smith");
    }

    #[test]
    fn test_confirm_outside_review_is_refused() {
        let refused = uploading().confirm().unwrap_err();
        assert_eq!(refused.session.status(), SessionStatus::Uploading);
    }

    #[test]
    fn test_reset_from_confirmed_releases_everything() {
        let (session, _) = reviewing().confirm().unwrap();
        let preview = session.preview_path().unwrap().to_path_buf();
        let id = session.id();

        let session = session.reset().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.records().is_empty());
        assert!(session.file().is_none());
        assert!(!preview.exists());
        assert_eq!(session.id(), id);
    }

    #[test]
    fn test_reset_from_error_releases_preview() {
        let session = errored();
        let preview = session.preview_path().unwrap().to_path_buf();
        let session = session.reset().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.records().is_empty());
        assert!(!preview.exists());
    }

    #[test]
    fn test_reset_from_review_discards_records() {
        let session = reviewing().reset().unwrap();
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.records().is_empty());
    }

    #[test]
    fn test_reset_refused_while_uploading() {
        let refused = uploading().reset().unwrap_err();
        assert_eq!(refused.session.status(), SessionStatus::Uploading);
    }

    #[test]
    fn test_select_refused_outside_idle_and_file_selected() {
        assert!(uploading().select_file(pdf()).is_err());
        assert!(errored().select_file(pdf()).is_err());
        assert!(reviewing().select_file(pdf()).is_err());
    }

    #[test]
    fn test_snapshot_reflects_session() {
        let snapshot = reviewing().snapshot();
        assert_eq!(snapshot.status, SessionStatus::Reviewing);
        assert!(snapshot.has_preview);
        assert_eq!(snapshot.file.unwrap().name, "resume.pdf");
        assert_eq!(snapshot.records.len(), 3);

        let json = serde_json::to_value(UploadSession::default().snapshot()).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["file"], Value::Null);
    }
}
