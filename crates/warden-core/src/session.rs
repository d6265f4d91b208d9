//! Per-run recognition memory: who has been greeted, when the last unknown
//! face was captured. Never persisted; a new process greets everyone again.

use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct SessionState {
    greeted: HashSet<String>,
    last_unknown_capture: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_greeted(&self, name: &str) -> bool {
        self.greeted.contains(name)
    }

    /// Adding a name twice is a no-op. Names never leave the set.
    pub fn mark_greeted(&mut self, name: &str) {
        if !self.greeted.contains(name) {
            self.greeted.insert(name.to_string());
        }
    }

    pub fn greeted_count(&self) -> usize {
        self.greeted.len()
    }

    /// Time since the last unknown-person capture, `None` if there has been
    /// none this session (treat as infinitely long ago).
    pub fn time_since_last_unknown_capture(&self, now: Instant) -> Option<Duration> {
        self.last_unknown_capture
            .map(|at| now.saturating_duration_since(at))
    }

    /// Record a capture at `now`. An older timestamp than the current one is
    /// ignored so the capture time only moves forward.
    pub fn record_unknown_capture(&mut self, now: Instant) {
        match self.last_unknown_capture {
            Some(prev) if prev >= now => {}
            _ => self.last_unknown_capture = Some(now),
        }
    }

    pub fn last_unknown_capture(&self) -> Option<Instant> {
        self.last_unknown_capture
    }
}
