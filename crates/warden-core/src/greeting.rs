//! Fire-and-forget greeting worker.
//!
//! The recognition loop enqueues names without waiting; one dedicated thread
//! drains the queue in FIFO order and runs the (slow, blocking) greeter.

use crate::ports::Greeter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default bound on pending greetings.
pub const DEFAULT_GREETING_CAPACITY: usize = 16;

/// Text spoken for a recognized person.
pub fn greeting_text(name: &str) -> String {
    format!("Hello, {name}, welcome back.")
}

/// Producer side of the greeting queue. Cheap to clone.
#[derive(Clone)]
pub struct GreetingQueue {
    tx: mpsc::Sender<String>,
}

impl GreetingQueue {
    /// Queue a greeting. Never blocks: when the queue is full or the worker
    /// is gone the greeting is dropped with a warning. Returns whether the
    /// name was queued.
    pub fn enqueue(&self, name: &str) -> bool {
        match self.tx.try_send(name.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(name)) => {
                tracing::warn!(name = %name, "greeting queue full; dropping greeting");
                false
            }
            Err(TrySendError::Closed(name)) => {
                tracing::warn!(name = %name, "greeting worker gone; dropping greeting");
                false
            }
        }
    }
}

/// Spawn the greeting worker on its own OS thread.
///
/// The thread exits when every [`GreetingQueue`] clone has been dropped; at
/// process exit it is simply abandoned.
pub fn spawn_greeter<G: Greeter>(
    mut greeter: G,
    capacity: usize,
) -> std::io::Result<(GreetingQueue, std::thread::JoinHandle<()>)> {
    let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));

    let handle = std::thread::Builder::new()
        .name("warden-greeter".into())
        .spawn(move || {
            tracing::debug!("greeter thread started");
            while let Some(name) = rx.blocking_recv() {
                tracing::info!(name = %name, greeting = %greeting_text(&name), "greeting");
                if let Err(err) = greeter.greet(&name) {
                    tracing::warn!(name = %name, error = %err, "greeting failed");
                }
            }
            tracing::debug!("greeter thread exiting");
        })?;

    Ok((GreetingQueue { tx }, handle))
}
