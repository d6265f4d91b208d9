//! Door lock timing and the controller that wraps it with logging and alerts.

use crate::ports::{AccessEventKind, Actuator, EventSink, Notifier, Signal};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default time the door stays unlocked after a successful recognition.
pub const DEFAULT_UNLOCK_DURATION: Duration = Duration::from_secs(5);

/// Lock state plus the auto-relock timer.
///
/// Only `unlock`/`lock` change the state. A high signal is sent only on a
/// locked → unlocked transition, so the actuator never sees two unlocks
/// without a lock in between.
pub struct DoorTimer {
    actuator: Box<dyn Actuator>,
    unlock_duration: Duration,
    locked: bool,
    unlocked_at: Option<Instant>,
}

impl DoorTimer {
    /// Wrap an actuator, starting in the locked state. The line itself is
    /// not touched until [`DoorTimer::engage`] or the first transition.
    pub fn new(actuator: Box<dyn Actuator>, unlock_duration: Duration) -> Self {
        Self {
            actuator,
            unlock_duration,
            locked: true,
            unlocked_at: None,
        }
    }

    /// Drive the line low to establish a known locked state at startup.
    pub fn engage(&mut self) {
        self.signal(Signal::Low);
        self.locked = true;
        self.unlocked_at = None;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn unlocked_at(&self) -> Option<Instant> {
        self.unlocked_at
    }

    pub fn unlock_duration(&self) -> Duration {
        self.unlock_duration
    }

    /// Unlock at `now`. Returns `true` if this was a locked → unlocked
    /// transition. When already unlocked the window restarts at `now` and no
    /// signal is sent.
    pub fn unlock(&mut self, now: Instant) -> bool {
        let transitioned = self.locked;
        if transitioned {
            self.signal(Signal::High);
            self.locked = false;
        }
        self.unlocked_at = Some(now);
        transitioned
    }

    pub fn lock(&mut self) {
        self.signal(Signal::Low);
        self.locked = true;
        self.unlocked_at = None;
    }

    /// Relock if the unlock window has elapsed. Returns whether a lock
    /// happened on this call.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.unlocked_at {
            Some(at) if !self.locked && now.saturating_duration_since(at) >= self.unlock_duration => {
                self.lock();
                true
            }
            _ => false,
        }
    }

    fn signal(&mut self, signal: Signal) {
        if let Err(err) = self.actuator.set_signal(signal) {
            tracing::warn!(error = %err, ?signal, "actuator signal failed");
        }
    }
}

/// [`DoorTimer`] plus the access log and unlock notification.
pub struct DoorController {
    timer: DoorTimer,
    sink: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
}

impl DoorController {
    pub fn new(timer: DoorTimer, sink: Arc<dyn EventSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            timer,
            sink,
            notifier,
        }
    }

    pub fn timer(&self) -> &DoorTimer {
        &self.timer
    }

    /// Drive the line low at startup without logging a lock event.
    pub fn engage(&mut self) {
        self.timer.engage();
    }

    /// Open the door for `person`: log `Door Opened` and mail a notice.
    pub fn unlock(&mut self, person: &str, now: Instant) {
        if !self.timer.unlock(now) {
            tracing::debug!(person, "door already unlocked; unlock window extended");
        }

        if let Err(err) = self.sink.record(AccessEventKind::DoorOpened, Some(person), None) {
            tracing::warn!(error = %err, "failed to record door opened");
        }

        let subject = format!("Door Unlocked - {person}");
        let body = format!(
            "The door was unlocked for {person} at {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.notifier.notify(&subject, &body, None);

        tracing::info!(person, "door unlocked");
    }

    /// Relock once the unlock window has passed.
    pub fn poll(&mut self, now: Instant) {
        if self.timer.poll(now) {
            self.record_locked();
        }
    }

    /// Lock unconditionally, used at shutdown.
    pub fn lock(&mut self) {
        self.timer.lock();
        self.record_locked();
    }

    fn record_locked(&self) {
        if let Err(err) = self.sink.record(AccessEventKind::DoorLocked, None, None) {
            tracing::warn!(error = %err, "failed to record door locked");
        }
        tracing::info!("door locked");
    }
}
