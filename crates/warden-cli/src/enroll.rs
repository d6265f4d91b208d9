//! Enrollment: one averaged embedding from several captured frames.

use anyhow::{anyhow, bail, Result};
use warden_core::ports::FaceExtractor;
use warden_core::Embedding;

/// Embed the most confident face of each frame and average the results.
///
/// Frames without a face are skipped with a warning; at least one frame
/// must contain a face.
pub fn average_embedding<F>(extractor: &mut dyn FaceExtractor<F>, frames: &[F]) -> Result<Embedding> {
    let mut samples = Vec::with_capacity(frames.len());

    for (i, frame) in frames.iter().enumerate() {
        let faces = extractor.detect_faces(frame)?;
        let Some(face) = faces.first() else {
            tracing::warn!(frame = i + 1, "no face found; skipping frame");
            continue;
        };
        if faces.len() > 1 {
            tracing::warn!(
                frame = i + 1,
                count = faces.len(),
                "multiple faces found; using the most confident"
            );
        }
        let mut embeddings = extractor.embed(frame, std::slice::from_ref(face))?;
        if let Some(embedding) = embeddings.pop() {
            samples.push(embedding);
        }
    }

    if samples.is_empty() {
        bail!("no face found in any of the {} captured frames", frames.len());
    }
    tracing::info!(used = samples.len(), captured = frames.len(), "averaging face embeddings");

    Embedding::mean(&samples).ok_or_else(|| anyhow!("no embeddings to average"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ports::ExtractorError;
    use warden_core::BoundingBox;

    /// Frames are just the value to embed; `None` has no face.
    struct ValueExtractor;

    impl FaceExtractor<Option<f32>> for ValueExtractor {
        fn detect_faces(&mut self, frame: &Option<f32>) -> Result<Vec<BoundingBox>, ExtractorError> {
            Ok(frame
                .map(|_| vec![BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9, landmarks: None }])
                .unwrap_or_default())
        }

        fn embed(
            &mut self,
            frame: &Option<f32>,
            faces: &[BoundingBox],
        ) -> Result<Vec<Embedding>, ExtractorError> {
            let v = frame.unwrap_or(0.0);
            Ok(faces.iter().map(|_| Embedding::new(vec![v, 1.0])).collect())
        }
    }

    #[test]
    fn test_average_skips_faceless_frames() {
        let frames = [Some(1.0), None, Some(3.0)];
        let mean = average_embedding(&mut ValueExtractor, &frames).unwrap();
        let expected = Embedding::new(vec![2.0, 1.0]).normalized();
        for (got, want) in mean.values.iter().zip(&expected.values) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_average_requires_a_face() {
        let frames = [None, None];
        assert!(average_embedding(&mut ValueExtractor, &frames).is_err());
    }
}
