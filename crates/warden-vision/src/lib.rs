//! warden-vision — ONNX face extraction for camera frames.
//!
//! [`OnnxExtractor`] pairs the SCRFD detector with the ArcFace embedder and
//! implements [`FaceExtractor`] for [`Frame`].

mod alignment;
pub mod detector;
pub mod embedder;
mod sampling;

use std::path::{Path, PathBuf};
use thiserror::Error;
use warden_core::ports::{ExtractorError, FaceExtractor};
use warden_core::{BoundingBox, Embedding};
use warden_hw::Frame;

pub use detector::FaceDetector;
pub use embedder::FaceEmbedder;

/// Detector model file name inside the model directory.
pub const DETECTOR_MODEL: &str = "det_10g.onnx";
/// Embedder model file name inside the model directory.
pub const EMBEDDER_MODEL: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("model file not found: {0} (place the insightface buffalo_l models in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Detector + embedder loaded from one model directory.
pub struct OnnxExtractor {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, VisionError> {
        let (det_path, emb_path) = model_paths(model_dir);
        let detector = FaceDetector::load(&det_path)?;
        let embedder = FaceEmbedder::load(&emb_path)?;
        Ok(Self { detector, embedder })
    }
}

/// Paths of the detector and embedder models inside `model_dir`.
pub fn model_paths(model_dir: &Path) -> (PathBuf, PathBuf) {
    (model_dir.join(DETECTOR_MODEL), model_dir.join(EMBEDDER_MODEL))
}

impl FaceExtractor<Frame> for OnnxExtractor {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, ExtractorError> {
        self.detector
            .detect(&frame.data, frame.width, frame.height)
            .map_err(|e| ExtractorError::Detection(e.to_string()))
    }

    fn embed(&mut self, frame: &Frame, faces: &[BoundingBox]) -> Result<Vec<Embedding>, ExtractorError> {
        faces
            .iter()
            .map(|face| {
                self.embedder
                    .embed(&frame.data, frame.width, frame.height, face)
                    .map_err(|e| ExtractorError::Embedding(e.to_string()))
            })
            .collect()
    }
}
