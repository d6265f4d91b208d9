//! One recognition session: door poll, sampled recognition, overlay.

use crate::decision::{AccessEngine, Action};
use crate::ports::{AccessEventKind, Annotate, ExtractorError, FaceExtractor};
use crate::sampler::FrameSampler;
use crate::types::{BoundingBox, Detection, EnrolledIdentity, Identity, Matcher};
use std::time::Instant;

/// Outcome of one processing cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Whether recognition ran on this cycle.
    pub sampled: bool,
    /// Actions taken, one per face, in detection order. Empty on skipped cycles.
    pub actions: Vec<Action>,
}

/// Drives the access engine from a stream of frames.
pub struct RecognitionPipeline<F> {
    extractor: Box<dyn FaceExtractor<F>>,
    matcher: Box<dyn Matcher + Send>,
    gallery: Vec<EnrolledIdentity>,
    threshold: f32,
    engine: AccessEngine<F>,
    sampler: FrameSampler,
    last_detections: Vec<(BoundingBox, Identity)>,
}

impl<F: Annotate> RecognitionPipeline<F> {
    pub fn new(
        extractor: Box<dyn FaceExtractor<F>>,
        matcher: Box<dyn Matcher + Send>,
        gallery: Vec<EnrolledIdentity>,
        threshold: f32,
        engine: AccessEngine<F>,
    ) -> Self {
        if gallery.is_empty() {
            tracing::warn!("no enrolled faces; every detected face will be treated as unknown");
        } else {
            tracing::info!(count = gallery.len(), "enrolled faces loaded");
        }

        Self {
            extractor,
            matcher,
            gallery,
            threshold,
            engine,
            sampler: FrameSampler::new(),
            last_detections: Vec::new(),
        }
    }

    pub fn engine(&self) -> &AccessEngine<F> {
        &self.engine
    }

    /// Most recent recognition results, redrawn on every cycle.
    pub fn last_detections(&self) -> &[(BoundingBox, Identity)] {
        &self.last_detections
    }

    /// Put the door in a known locked state and log `System Started`.
    pub fn start(&mut self) {
        self.engine.door_mut().engage();
        self.engine.record(AccessEventKind::SystemStarted, None, None);
    }

    /// Lock the door and log `System Stopped`.
    pub fn shutdown(&mut self) {
        self.engine.door_mut().lock();
        self.engine.record(AccessEventKind::SystemStopped, None, None);
    }

    /// Record a fatal session error (camera gone, extractor failure).
    pub fn record_error(&self, details: &str) {
        self.engine.record(AccessEventKind::Error, None, Some(details));
    }

    /// Run one cycle on `frame` at `now`.
    ///
    /// The door timer is polled first regardless of sampling. On sampled
    /// cycles faces are detected, embedded, matched and acted on. Every cycle
    /// then draws the latest detections onto the frame.
    pub fn cycle(&mut self, frame: &mut F, now: Instant) -> Result<CycleReport, ExtractorError> {
        self.engine.door_mut().poll(now);

        let mut report = CycleReport::default();

        if self.sampler.next_cycle() {
            report.sampled = true;

            let faces = self.extractor.detect_faces(frame)?;
            let embeddings = if faces.is_empty() {
                Vec::new()
            } else {
                self.extractor.embed(frame, &faces)?
            };
            if embeddings.len() != faces.len() {
                return Err(ExtractorError::Embedding(format!(
                    "{} faces detected but {} embeddings returned",
                    faces.len(),
                    embeddings.len()
                )));
            }

            let detections = faces
                .into_iter()
                .zip(embeddings)
                .map(|(face, embedding)| Detection { face, embedding });

            self.last_detections.clear();
            for detection in detections {
                let result = self.matcher.compare(&detection.embedding, &self.gallery, self.threshold);
                tracing::trace!(identity = %result.identity, distance = result.distance, "face matched");

                let action = self.engine.handle(&result, frame, now);
                self.last_detections.push((detection.face, result.identity));
                report.actions.push(action);
            }
        }

        for (face, identity) in &self.last_detections {
            frame.draw_detection(face, identity.is_known());
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::tests::harness;
    use crate::ports::Signal;
    use crate::types::{Embedding, EuclideanMatcher};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Frame stand-in: counts overlay draws.
    #[derive(Default)]
    struct Canvas {
        drawn: Vec<bool>,
    }

    impl Annotate for Canvas {
        fn draw_detection(&mut self, _face: &BoundingBox, known: bool) {
            self.drawn.push(known);
        }
    }

    /// Replays one scripted list of embeddings per `detect_faces` call.
    struct Scripted {
        script: VecDeque<Vec<Embedding>>,
        current: Vec<Embedding>,
        detect_calls: Arc<Mutex<usize>>,
    }

    impl FaceExtractor<Canvas> for Scripted {
        fn detect_faces(&mut self, _frame: &Canvas) -> Result<Vec<BoundingBox>, ExtractorError> {
            *self.detect_calls.lock().unwrap() += 1;
            self.current = self.script.pop_front().unwrap_or_default();
            Ok(self
                .current
                .iter()
                .map(|_| BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9, landmarks: None })
                .collect())
        }

        fn embed(&mut self, _frame: &Canvas, faces: &[BoundingBox]) -> Result<Vec<Embedding>, ExtractorError> {
            assert_eq!(faces.len(), self.current.len());
            Ok(self.current.clone())
        }
    }

    struct Broken;

    impl FaceExtractor<Canvas> for Broken {
        fn detect_faces(&mut self, _frame: &Canvas) -> Result<Vec<BoundingBox>, ExtractorError> {
            Err(ExtractorError::Detection("session closed".into()))
        }

        fn embed(&mut self, _frame: &Canvas, _faces: &[BoundingBox]) -> Result<Vec<Embedding>, ExtractorError> {
            unreachable!()
        }
    }

    /// Finds two faces but only embeds one.
    struct Short;

    impl FaceExtractor<Canvas> for Short {
        fn detect_faces(&mut self, _frame: &Canvas) -> Result<Vec<BoundingBox>, ExtractorError> {
            let face = BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9, landmarks: None };
            Ok(vec![face, face])
        }

        fn embed(&mut self, _frame: &Canvas, _faces: &[BoundingBox]) -> Result<Vec<Embedding>, ExtractorError> {
            Ok(vec![Embedding::new(vec![0.1, 0.2, 0.3])])
        }
    }

    /// Rebuild the shared harness over `Canvas` frames.
    fn pipeline(
        extractor: Box<dyn FaceExtractor<Canvas>>,
        gallery: Vec<EnrolledIdentity>,
    ) -> (RecognitionPipeline<Canvas>, crate::decision::tests::Harness) {
        use crate::decision::AccessEngine;
        use crate::door::{DoorController, DoorTimer, DEFAULT_UNLOCK_DURATION};
        use crate::greeting::GreetingQueue;
        use crate::ports::SnapshotWriter;

        struct NullSnapshots;
        impl SnapshotWriter<Canvas> for NullSnapshots {
            fn save(&self, _frame: &Canvas) -> std::io::Result<std::path::PathBuf> {
                Ok("/tmp/unknown.jpg".into())
            }
        }

        let h = harness();
        let timer = DoorTimer::new(Box::new(h.actuator.clone()), DEFAULT_UNLOCK_DURATION);
        let door = DoorController::new(timer, h.sink.clone(), h.notifier.clone());
        let greetings: GreetingQueue = {
            let (queue, _) = crate::greeting::spawn_greeter(NoGreet, 4).unwrap();
            queue
        };
        let engine = AccessEngine::new(
            door,
            h.sink.clone(),
            h.notifier.clone(),
            Box::new(NullSnapshots),
            greetings,
            Duration::from_secs(5),
        );
        let pipeline = RecognitionPipeline::new(
            extractor,
            Box::new(EuclideanMatcher),
            gallery,
            0.6,
            engine,
        );
        (pipeline, h)
    }

    struct NoGreet;
    impl crate::ports::Greeter for NoGreet {
        fn greet(&mut self, _name: &str) -> Result<(), crate::ports::GreetError> {
            Ok(())
        }
    }

    fn alice() -> EnrolledIdentity {
        EnrolledIdentity {
            name: "Alice".into(),
            embedding: Embedding::new(vec![0.1, 0.2, 0.3]),
        }
    }

    #[test]
    fn test_recognition_runs_on_alternate_cycles_and_door_relocks() {
        let calls = Arc::new(Mutex::new(0));
        let extractor = Scripted {
            script: VecDeque::from(vec![vec![Embedding::new(vec![0.1, 0.2, 0.3])]]),
            current: Vec::new(),
            detect_calls: calls.clone(),
        };
        let (mut pipeline, h) = pipeline(Box::new(extractor), vec![alice()]);

        let t0 = Instant::now();
        let mut frame = Canvas::default();

        let first = pipeline.cycle(&mut frame, t0).unwrap();
        assert!(first.sampled);
        assert_eq!(first.actions, vec![Action::GreetAndUnlock("Alice".into())]);

        // Skipped cycle: no recognition, but the last box is still drawn.
        let second = pipeline.cycle(&mut frame, t0 + Duration::from_secs(1)).unwrap();
        assert!(!second.sampled);
        assert!(second.actions.is_empty());
        assert_eq!(frame.drawn, vec![true, true]);

        // Skipped cycle at t=5 must still relock the door.
        pipeline.cycle(&mut frame, t0 + Duration::from_secs(2)).unwrap();
        pipeline.cycle(&mut frame, t0 + Duration::from_secs(5)).unwrap();

        assert_eq!(*calls.lock().unwrap(), 2);
        assert!(pipeline.engine().door().timer().is_locked());
        assert_eq!(*h.actuator.signals.lock().unwrap(), vec![Signal::High, Signal::Low]);
    }

    #[test]
    fn test_empty_gallery_treats_everyone_as_unknown() {
        let extractor = Scripted {
            script: VecDeque::from(vec![vec![
                Embedding::new(vec![0.9, 0.9]),
                Embedding::new(vec![0.1, 0.1]),
            ]]),
            current: Vec::new(),
            detect_calls: Arc::new(Mutex::new(0)),
        };
        let (mut pipeline, _h) = pipeline(Box::new(extractor), Vec::new());
        let mut frame = Canvas::default();

        let report = pipeline.cycle(&mut frame, Instant::now()).unwrap();
        assert_eq!(report.actions, vec![Action::CaptureAndAlert, Action::LogOnly]);
        assert_eq!(frame.drawn, vec![false, false]);
        assert!(pipeline
            .last_detections()
            .iter()
            .all(|(_, identity)| *identity == Identity::Unknown));
    }

    #[test]
    fn test_extractor_failure_is_returned() {
        let (mut pipeline, _h) = pipeline(Box::new(Broken), vec![alice()]);
        let mut frame = Canvas::default();
        assert!(pipeline.cycle(&mut frame, Instant::now()).is_err());
    }

    #[test]
    fn test_embedding_count_mismatch_is_an_error() {
        let (mut pipeline, h) = pipeline(Box::new(Short), vec![alice()]);
        let mut frame = Canvas::default();

        let err = pipeline.cycle(&mut frame, Instant::now()).unwrap_err();
        assert!(matches!(err, ExtractorError::Embedding(_)));
        assert!(pipeline.last_detections().is_empty());
        assert!(h.actuator.signals.lock().unwrap().is_empty());
    }

    #[test]
    fn test_start_and_shutdown_log_lifecycle() {
        let (mut pipeline, h) = pipeline(Box::new(Broken), vec![]);
        pipeline.start();
        pipeline.record_error("Failed to grab frame from camera");
        pipeline.shutdown();

        assert_eq!(
            h.sink.kinds(),
            vec![
                AccessEventKind::SystemStarted,
                AccessEventKind::Error,
                AccessEventKind::DoorLocked,
                AccessEventKind::SystemStopped,
            ]
        );
        assert_eq!(*h.actuator.signals.lock().unwrap(), vec![Signal::Low, Signal::Low]);
    }
}
