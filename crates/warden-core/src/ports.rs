//! Collaborator interfaces the access state machine drives.
//!
//! Everything here is implemented outside this crate: the SQLite store, the
//! SMTP notifier, the GPIO line, the ONNX extractor. The state machine only
//! ever sees these traits.

use crate::types::{BoundingBox, Embedding};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Kind of event written to the access log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessEventKind {
    SystemStarted,
    SystemStopped,
    AuthorizedAccess,
    UnknownPersonDetected,
    DoorOpened,
    DoorLocked,
    Error,
}

impl AccessEventKind {
    /// Stored form of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessEventKind::SystemStarted => "System Started",
            AccessEventKind::SystemStopped => "System Stopped",
            AccessEventKind::AuthorizedAccess => "Authorized Access",
            AccessEventKind::UnknownPersonDetected => "Unknown Person Detected",
            AccessEventKind::DoorOpened => "Door Opened",
            AccessEventKind::DoorLocked => "Door Locked",
            AccessEventKind::Error => "Error",
        }
    }
}

impl fmt::Display for AccessEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by an [`EventSink`]. Carries the backend's message only;
/// callers log it and move on.
#[derive(Debug, Error)]
#[error("event sink: {0}")]
pub struct SinkError(pub String);

/// Persistence + audit log for access events.
pub trait EventSink: Send + Sync {
    fn record(
        &self,
        kind: AccessEventKind,
        person: Option<&str>,
        details: Option<&str>,
    ) -> Result<(), SinkError>;

    /// Update the user's last-seen time and bump their access counter.
    fn touch_user(&self, name: &str) -> Result<(), SinkError>;
}

/// Outbound alert channel (email in the daemon).
pub trait Notifier: Send + Sync {
    /// Deliver a message. Returns whether it was sent; failures are logged by
    /// the implementation.
    fn notify(&self, subject: &str, body: &str, attachment: Option<&Path>) -> bool;
}

/// Level driven onto the lock line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Door unlocked.
    High,
    /// Door locked.
    Low,
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("line request failed: {0}")]
    Request(std::io::Error),
    #[error("set value failed: {0}")]
    SetValue(std::io::Error),
}

/// Physical or simulated lock mechanism.
pub trait Actuator: Send {
    fn set_signal(&mut self, signal: Signal) -> Result<(), ActuatorError>;
}

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("embedding extraction failed: {0}")]
    Embedding(String),
}

/// Face detector + embedder over frames of type `F`.
pub trait FaceExtractor<F>: Send {
    fn detect_faces(&mut self, frame: &F) -> Result<Vec<BoundingBox>, ExtractorError>;

    /// One embedding per box, same order as `faces`.
    fn embed(&mut self, frame: &F, faces: &[BoundingBox]) -> Result<Vec<Embedding>, ExtractorError>;
}

/// Persists the frame that triggered an unknown-person alert.
pub trait SnapshotWriter<F>: Send {
    fn save(&self, frame: &F) -> std::io::Result<PathBuf>;
}

/// Draws detection results onto a frame for display.
pub trait Annotate {
    fn draw_detection(&mut self, face: &BoundingBox, known: bool);
}

#[derive(Debug, Error)]
pub enum GreetError {
    #[error("failed to run greeting command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("greeting command exited with {0}")]
    Exit(std::process::ExitStatus),
}

/// Blocking greeting output (speech, chime). Runs on the greeter thread.
pub trait Greeter: Send + 'static {
    fn greet(&mut self, name: &str) -> Result<(), GreetError>;
}
