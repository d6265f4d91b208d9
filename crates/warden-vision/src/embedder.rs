//! ArcFace embedding via ONNX Runtime.
//!
//! Faces with detector landmarks are warped onto the ArcFace template; boxes
//! without landmarks fall back to a squared crop with a small margin. Either
//! way the face is resampled to the 112x112 model input and the output is
//! L2-normalized.

use crate::alignment::{Similarity, TEMPLATE_112};
use crate::sampling::bilinear;
use crate::VisionError;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use warden_core::{BoundingBox, Embedding};

const CROP_SIZE: usize = 112;
// ArcFace normalizes symmetrically, unlike SCRFD.
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 127.5;
pub const EMBEDDING_DIM: usize = 512;
/// Fraction of the box size added on each side before cropping.
const CROP_MARGIN: f32 = 0.1;

pub const MODEL_VERSION: &str = "w600k_r50";

/// Square crop window in source-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CropWindow {
    pub left: f32,
    pub top: f32,
    pub side: f32,
}

impl CropWindow {
    pub fn around(face: &BoundingBox) -> Self {
        let side = face.width.max(face.height) * (1.0 + 2.0 * CROP_MARGIN);
        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;
        Self {
            left: cx - side / 2.0,
            top: cy - side / 2.0,
            side,
        }
    }
}

pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), version = MODEL_VERSION, "loaded ArcFace model");
        Ok(Self { session })
    }

    /// Compute the embedding of one detected face.
    pub fn embed(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<Embedding, VisionError> {
        if face.width <= 0.0 || face.height <= 0.0 {
            return Err(VisionError::InferenceFailed(format!(
                "degenerate face box {}x{}",
                face.width, face.height
            )));
        }

        let (w, h) = (width as usize, height as usize);
        let aligned = face
            .landmarks
            .and_then(|points| Similarity::estimate(&points, &TEMPLATE_112));
        let input = match aligned {
            Some(transform) => aligned_tensor(gray, w, h, &transform),
            None => crop_tensor(gray, w, h, CropWindow::around(face)),
        };
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(VisionError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        let mut embedding = Embedding::new(l2_normalize(raw));
        embedding.model_version = Some(MODEL_VERSION.to_string());
        Ok(embedding)
    }
}

/// Resample the crop window into a normalized 1x3x112x112 tensor.
fn crop_tensor(gray: &[u8], width: usize, height: usize, window: CropWindow) -> Array4<f32> {
    let step = window.side / CROP_SIZE as f32;
    sample_tensor(gray, width, height, |tx, ty| {
        (
            window.left + (tx + 0.5) * step - 0.5,
            window.top + (ty + 0.5) * step - 0.5,
        )
    })
}

/// Warp the frame through `transform` (frame -> template) into the input tensor.
fn aligned_tensor(gray: &[u8], width: usize, height: usize, transform: &Similarity) -> Array4<f32> {
    sample_tensor(gray, width, height, |tx, ty| transform.invert(tx, ty))
}

/// Fill a normalized 1x3x112x112 tensor; `source` maps a tensor pixel to
/// frame coordinates.
fn sample_tensor(
    gray: &[u8],
    width: usize,
    height: usize,
    source: impl Fn(f32, f32) -> (f32, f32),
) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, CROP_SIZE, CROP_SIZE));

    for ty in 0..CROP_SIZE {
        for tx in 0..CROP_SIZE {
            let (sx, sy) = source(tx as f32, ty as f32);
            let v = (bilinear(gray, width, height, sx, sy) - PIXEL_MEAN) / PIXEL_STD;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = v;
            }
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
