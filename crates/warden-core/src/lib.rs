//! warden-core — Face matching and the session-scoped access state machine.
//!
//! Decides per detected face whether to greet and unlock, ignore, or capture
//! and alert, and keeps the door relock timer independent of how often
//! recognition runs. Hardware, storage and notification sit behind the
//! traits in [`ports`].

pub mod config;
pub mod decision;
pub mod door;
pub mod gallery;
pub mod greeting;
pub mod pipeline;
pub mod ports;
pub mod sampler;
pub mod session;
pub mod types;

pub use config::{ActuatorKind, Config, SmtpConfig};
pub use decision::{AccessEngine, Action};
pub use door::{DoorController, DoorTimer};
pub use pipeline::RecognitionPipeline;
pub use ports::{AccessEventKind, Actuator, EventSink, FaceExtractor, Notifier, Signal};
pub use session::SessionState;
pub use types::{
    BoundingBox, Detection, Embedding, EnrolledIdentity, EuclideanMatcher, Identity, Landmarks,
    MatchResult, Matcher,
};
