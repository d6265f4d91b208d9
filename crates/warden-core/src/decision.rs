//! Per-face access decisions and their side effects.

use crate::door::DoorController;
use crate::greeting::GreetingQueue;
use crate::ports::{AccessEventKind, EventSink, Notifier, SnapshotWriter};
use crate::session::SessionState;
use crate::types::{Identity, MatchResult};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default minimum gap between two unknown-person captures.
pub const DEFAULT_UNKNOWN_COOLDOWN: Duration = Duration::from_secs(5);

pub const UNKNOWN_ALERT_SUBJECT: &str = "Security Alert - Unknown Person Detected";

/// What to do about one detected face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Known and first seen this session.
    GreetAndUnlock(String),
    /// Known and already greeted.
    NoOp,
    /// Unknown and outside the capture cooldown.
    CaptureAndAlert,
    /// Unknown and inside the capture cooldown.
    LogOnly,
}

impl Action {
    /// Pure classification of a match against the session at `now`.
    pub fn classify(
        result: &MatchResult,
        session: &SessionState,
        now: Instant,
        cooldown: Duration,
    ) -> Action {
        match &result.identity {
            Identity::Known(name) if session.has_greeted(name) => Action::NoOp,
            Identity::Known(name) => Action::GreetAndUnlock(name.clone()),
            Identity::Unknown => match session.time_since_last_unknown_capture(now) {
                Some(elapsed) if elapsed <= cooldown => Action::LogOnly,
                _ => Action::CaptureAndAlert,
            },
        }
    }
}

/// Owns the session state and applies each decision through the injected
/// collaborators.
pub struct AccessEngine<F> {
    session: SessionState,
    cooldown: Duration,
    door: DoorController,
    sink: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
    snapshots: Box<dyn SnapshotWriter<F>>,
    greetings: GreetingQueue,
}

impl<F> AccessEngine<F> {
    pub fn new(
        door: DoorController,
        sink: Arc<dyn EventSink>,
        notifier: Arc<dyn Notifier>,
        snapshots: Box<dyn SnapshotWriter<F>>,
        greetings: GreetingQueue,
        cooldown: Duration,
    ) -> Self {
        Self {
            session: SessionState::new(),
            cooldown,
            door,
            sink,
            notifier,
            snapshots,
            greetings,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn door(&self) -> &DoorController {
        &self.door
    }

    pub fn door_mut(&mut self) -> &mut DoorController {
        &mut self.door
    }

    /// Classify `result` and commit the session-state change it implies
    /// (greeted set or capture time). No other side effects.
    pub fn decide(&mut self, result: &MatchResult, now: Instant) -> Action {
        let action = Action::classify(result, &self.session, now, self.cooldown);
        match &action {
            Action::GreetAndUnlock(name) => self.session.mark_greeted(name),
            Action::CaptureAndAlert => self.session.record_unknown_capture(now),
            Action::NoOp | Action::LogOnly => {}
        }
        action
    }

    /// Decide and carry out the action for one face in `frame`.
    pub fn handle(&mut self, result: &MatchResult, frame: &F, now: Instant) -> Action {
        let action = self.decide(result, now);

        match &action {
            Action::GreetAndUnlock(name) => {
                self.greetings.enqueue(name);
                self.door.unlock(name, now);
                self.record(AccessEventKind::AuthorizedAccess, Some(name), None);
                if let Err(err) = self.sink.touch_user(name) {
                    tracing::warn!(name = %name, error = %err, "failed to update user access");
                }
            }
            Action::NoOp => {}
            Action::CaptureAndAlert => {
                self.record(AccessEventKind::UnknownPersonDetected, None, None);
                tracing::warn!(distance = result.distance, "unknown person detected; capturing");
                self.capture_and_alert(frame);
            }
            Action::LogOnly => {
                // Logged on every sampled frame, cooldown or not.
                self.record(AccessEventKind::UnknownPersonDetected, None, None);
                tracing::debug!("unknown person still present; within capture cooldown");
            }
        }

        action
    }

    /// Write an event, logging instead of failing.
    pub fn record(&self, kind: AccessEventKind, person: Option<&str>, details: Option<&str>) {
        if let Err(err) = self.sink.record(kind, person, details) {
            tracing::warn!(event = %kind, error = %err, "failed to record access event");
        }
    }

    fn capture_and_alert(&self, frame: &F) {
        let path = match self.snapshots.save(frame) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "unknown person snapshot saved");
                Some(path)
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to save unknown person snapshot");
                None
            }
        };

        let body = format!(
            "An unknown person was detected at {}\n\nImage attached.",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        if !self
            .notifier
            .notify(UNKNOWN_ALERT_SUBJECT, &body, path.as_deref())
        {
            tracing::debug!("unknown person alert not delivered");
        }
    }
}
