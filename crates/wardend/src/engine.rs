//! The recognition loop, run on a dedicated OS thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use warden_core::ports::Annotate;
use warden_core::RecognitionPipeline;
use warden_hw::{Camera, Frame};

/// Recorded when the camera stops delivering frames.
pub const FRAME_ERROR: &str = "Failed to grab frame from camera";
/// Recorded when the session panics.
const PANIC_ERROR: &str = "Recognition session panicked";

/// Publishes the latest annotated frame as JPEG.
pub type FrameSender = watch::Sender<Option<Vec<u8>>>;

/// Spawn the engine thread.
///
/// The thread logs `System Started`, then captures and processes frames until
/// `stop` is set or the session ends on a capture or extraction failure. It
/// always locks the door and logs `System Stopped` before exiting, including
/// when the session panics.
pub fn spawn_engine(
    camera: Camera,
    mut pipeline: RecognitionPipeline<Frame>,
    frames: Option<FrameSender>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("warden-engine".into())
        .spawn(move || {
            tracing::info!(device = %camera.device_path, "engine thread started");
            run_guarded(&mut pipeline, |pipeline| {
                run_session(&camera, pipeline, frames.as_ref(), &stop)
            });
            tracing::info!("engine thread exiting");
        })
}

/// Start the pipeline, run `session`, then shut down no matter how the
/// session ended. A panic is recorded as an `Error` event and resumed once
/// the door is locked.
fn run_guarded<F: Annotate>(
    pipeline: &mut RecognitionPipeline<F>,
    session: impl FnOnce(&mut RecognitionPipeline<F>),
) {
    pipeline.start();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| session(pipeline)));
    if outcome.is_err() {
        tracing::error!("recognition session panicked; locking door");
        pipeline.record_error(PANIC_ERROR);
    }
    pipeline.shutdown();
    if let Err(payload) = outcome {
        panic::resume_unwind(payload);
    }
}

fn run_session(
    camera: &Camera,
    pipeline: &mut RecognitionPipeline<Frame>,
    frames: Option<&FrameSender>,
    stop: &AtomicBool,
) {
    let mut stream = match camera.stream() {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(error = %err, "failed to start capture stream");
            pipeline.record_error(FRAME_ERROR);
            return;
        }
    };

    while !stop.load(Ordering::Relaxed) {
        let mut frame = match stream.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "frame capture failed; ending session");
                pipeline.record_error(FRAME_ERROR);
                return;
            }
        };

        match pipeline.cycle(&mut frame, Instant::now()) {
            Ok(report) if report.sampled => {
                tracing::trace!(sequence = frame.sequence, actions = ?report.actions, "frame processed");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "face extraction failed; ending session");
                pipeline.record_error(&err.to_string());
                return;
            }
        }

        if let Some(frames) = frames {
            publish(frames, &frame);
        }
    }

    tracing::info!("stop requested");
}

fn publish(frames: &FrameSender, frame: &Frame) {
    match frame.to_jpeg() {
        Ok(jpeg) => {
            frames.send_replace(Some(jpeg));
        }
        Err(err) => tracing::debug!(error = %err, "failed to encode preview frame"),
    }
}
