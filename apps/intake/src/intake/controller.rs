//! Intake workflow controller.
//!
//! One task per session. User intents, simulator ticks and transport results all
//! arrive on the same queue and are applied one at a time, so no two transitions
//! ever interleave on a session. A snapshot is published after every event.
//!
//! The controller holds only a weak sender to its own queue; the spawned upload
//! and simulator tasks hold strong ones for as long as they run. Once every
//! `IntakeHandle` is gone and those tasks end, the loop exits and the preview is
//! released.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::intake::document::DocumentFile;
use crate::intake::error::IntakeError;
use crate::intake::persistence::RecordSink;
use crate::intake::progress::{ProgressConfig, ProgressSimulator, ProgressTick};
use crate::intake::session::{Refused, SessionSnapshot, Transition, UploadSession};
use crate::intake::transport::UploadTransport;

/// Collaborators shared by every controller.
#[derive(Clone)]
pub struct ControllerDeps {
    pub transport: Arc<dyn UploadTransport>,
    pub sink: Arc<dyn RecordSink>,
    pub progress: ProgressConfig,
}

/// Where the preview document for a session currently lives.
#[derive(Debug, Clone)]
pub struct PreviewDocument {
    pub path: PathBuf,
    pub name: String,
    pub content_type: String,
}

enum Command {
    SelectFile(DocumentFile),
    RemoveFile,
    StartUpload,
    EditField { path: String, value: String },
    Confirm,
    Reset,
    Snapshot,
}

enum Event {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<SessionSnapshot, IntakeError>>,
    },
    Preview {
        reply: oneshot::Sender<Option<PreviewDocument>>,
    },
    Tick(ProgressTick),
    UploadFinished {
        attempt: u64,
        outcome: Result<Value, IntakeError>,
    },
    Shutdown,
}

// ────────────────────────────────────────────────────────────────────────────
// Handle
// ────────────────────────────────────────────────────────────────────────────

/// Cheap, cloneable front door to one running controller.
#[derive(Clone)]
pub struct IntakeHandle {
    id: Uuid,
    events: mpsc::UnboundedSender<Event>,
    snapshots: watch::Receiver<SessionSnapshot>,
    activity: watch::Receiver<Instant>,
}

impl IntakeHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drop and manual selection both land here.
    pub async fn select_file(&self, file: DocumentFile) -> Result<SessionSnapshot, IntakeError> {
        self.request(Command::SelectFile(file)).await
    }

    pub async fn remove_file(&self) -> Result<SessionSnapshot, IntakeError> {
        self.request(Command::RemoveFile).await
    }

    /// Starts the upload, or retries it from Error. Returns as soon as the
    /// session is Uploading; completion is observed through snapshots.
    pub async fn start_upload(&self) -> Result<SessionSnapshot, IntakeError> {
        self.request(Command::StartUpload).await
    }

    pub async fn edit_field(
        &self,
        path: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<SessionSnapshot, IntakeError> {
        self.request(Command::EditField {
            path: path.into(),
            value: value.into(),
        })
        .await
    }

    pub async fn confirm(&self) -> Result<SessionSnapshot, IntakeError> {
        self.request(Command::Confirm).await
    }

    pub async fn reset(&self) -> Result<SessionSnapshot, IntakeError> {
        self.request(Command::Reset).await
    }

    /// Snapshot taken after every event queued so far has been applied.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, IntakeError> {
        self.request(Command::Snapshot).await
    }

    /// When the controller last handled a user request or an upload result.
    pub fn last_activity(&self) -> Instant {
        *self.activity.borrow()
    }

    /// Last published snapshot, without queueing.
    #[cfg(test)]
    pub fn latest(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub async fn preview(&self) -> Result<Option<PreviewDocument>, IntakeError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Event::Preview { reply })
            .map_err(|_| IntakeError::SessionClosed)?;
        rx.await.map_err(|_| IntakeError::SessionClosed)
    }

    /// Stops the controller and releases the session's resources.
    pub fn close(&self) {
        let _ = self.events.send(Event::Shutdown);
    }

    async fn request(&self, command: Command) -> Result<SessionSnapshot, IntakeError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(Event::Command { command, reply })
            .map_err(|_| IntakeError::SessionClosed)?;
        rx.await.map_err(|_| IntakeError::SessionClosed)?
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

pub struct IntakeController {
    session: UploadSession,
    deps: ControllerDeps,
    events_tx: mpsc::WeakUnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    snapshots: watch::Sender<SessionSnapshot>,
    activity: watch::Sender<Instant>,
    simulator: Option<ProgressSimulator>,
    upload: Option<JoinHandle<()>>,
}

impl IntakeController {
    /// Creates a fresh Idle session and runs its controller on the tokio runtime.
    pub fn spawn(deps: ControllerDeps) -> IntakeHandle {
        let session = UploadSession::default();
        let id = session.id();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(session.snapshot());
        let (activity, activity_rx) = watch::channel(Instant::now());

        let controller = IntakeController {
            session,
            deps,
            events_tx: events_tx.downgrade(),
            events_rx,
            snapshots,
            activity,
            simulator: None,
            upload: None,
        };
        tokio::spawn(controller.run());

        info!(session_id = %id, "Intake session opened");
        IntakeHandle {
            id,
            events: events_tx,
            snapshots: snapshot_rx,
            activity: activity_rx,
        }
    }

    async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            if !self.handle(event) {
                break;
            }
            self.publish();
        }
        self.shutdown();
    }

    /// Applies one event. Returns `false` once the controller should stop.
    fn handle(&mut self, event: Event) -> bool {
        if !matches!(event, Event::Tick(_) | Event::Shutdown) {
            self.activity.send_replace(Instant::now());
        }
        match event {
            Event::Command { command, reply } => {
                let result = self.apply(command).map(|_| self.session.snapshot());
                self.publish();
                let _ = reply.send(result);
            }
            Event::Preview { reply } => {
                let preview = self.session.file().zip(self.session.preview_path()).map(
                    |(file, path)| PreviewDocument {
                        path: path.to_path_buf(),
                        name: file.name.clone(),
                        content_type: file.content_type.clone(),
                    },
                );
                let _ = reply.send(preview);
            }
            Event::Tick(tick) => {
                self.replace(|s| s.apply_tick(tick.attempt, tick.progress));
            }
            Event::UploadFinished { attempt, outcome } => {
                self.stop_simulator(attempt);
                self.upload = None;
                if let Err(e) = &outcome {
                    warn!(session_id = %self.session.id(), attempt, "Upload failed: {e}");
                }
                self.replace(|s| s.finish_upload(attempt, outcome));
            }
            Event::Shutdown => return false,
        }
        true
    }

    fn apply(&mut self, command: Command) -> Result<(), IntakeError> {
        match command {
            Command::SelectFile(file) => self.transition(|s| s.select_file(file)),
            Command::RemoveFile => self.transition(UploadSession::remove_file),
            Command::StartUpload => {
                self.transition(UploadSession::start_upload)?;
                self.begin_upload();
                Ok(())
            }
            Command::EditField { path, value } => {
                self.transition(|s| s.edit_field(&path, &value))
            }
            Command::Confirm => self.confirm(),
            Command::Reset => self.transition(UploadSession::reset),
            Command::Snapshot => Ok(()),
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }

    /// Runs a transition; a refusal puts the unchanged session back.
    fn transition<F>(&mut self, f: F) -> Result<(), IntakeError>
    where
        F: FnOnce(UploadSession) -> Transition,
    {
        match f(std::mem::take(&mut self.session)) {
            Ok(next) => {
                self.session = next;
                Ok(())
            }
            Err(Refused { session, error }) => {
                debug!(session_id = %session.id(), "Refused: {error}");
                self.session = session;
                Err(error)
            }
        }
    }

    fn replace<F>(&mut self, f: F)
    where
        F: FnOnce(UploadSession) -> UploadSession,
    {
        self.session = f(std::mem::take(&mut self.session));
    }

    /// Starts the simulator and the transport call for the attempt the session just entered.
    fn begin_upload(&mut self) {
        let attempt = self.session.attempt();
        let Some(file) = self.session.file().cloned() else {
            return;
        };
        let Some(events) = self.events_tx.upgrade() else {
            self.replace(|s| s.finish_upload(attempt, Err(IntakeError::SessionClosed)));
            return;
        };

        let tick_events = events.clone();
        self.simulator = Some(ProgressSimulator::start(
            self.deps.progress,
            attempt,
            move |tick| tick_events.send(Event::Tick(tick)).is_ok(),
        ));

        info!(
            session_id = %self.session.id(),
            attempt,
            file = %file.name,
            "Uploading document ({} bytes)",
            file.size_bytes()
        );
        let transport = Arc::clone(&self.deps.transport);
        self.upload = Some(tokio::spawn(async move {
            let outcome = transport.upload(file).await.map_err(IntakeError::from);
            let _ = events.send(Event::UploadFinished { attempt, outcome });
        }));
    }

    fn stop_simulator(&mut self, attempt: u64) {
        if let Some(mut simulator) = self.simulator.take() {
            if simulator.attempt() != attempt {
                self.simulator = Some(simulator);
                return;
            }
            simulator.stop();
        }
    }

    /// Reviewing → Confirmed, then exactly one fire-and-forget persist call.
    fn confirm(&mut self) -> Result<(), IntakeError> {
        let (next, records) = match std::mem::take(&mut self.session).confirm() {
            Ok(confirmed) => confirmed,
            Err(Refused { session, error }) => {
                self.session = session;
                return Err(error);
            }
        };
        self.session = next;

        let session_id = self.session.id();
        let sink = Arc::clone(&self.deps.sink);
        tokio::spawn(async move {
            match sink.persist(session_id, records).await {
                Ok(row_id) => info!(%session_id, %row_id, "Confirmed record set persisted"),
                Err(e) => error!(%session_id, "Failed to persist confirmed record set: {e}"),
            }
        });
        Ok(())
    }

    fn shutdown(mut self) {
        if let Some(mut simulator) = self.simulator.take() {
            simulator.stop();
        }
        if let Some(upload) = self.upload.take() {
            upload.abort();
        }
        info!(session_id = %self.session.id(), "Intake session closed");
        std::mem::take(&mut self.session).close();
    }
}
