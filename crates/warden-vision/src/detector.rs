//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free decoding over three stride levels followed by greedy NMS.
//! Grayscale input is replicated to three channels. Five-point landmarks are
//! decoded when the model exports keypoint outputs.

use crate::sampling::bilinear;
use crate::VisionError;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use warden_core::types::Landmarks;
use warden_core::BoundingBox;

const INPUT_SIZE: usize = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const SCORE_THRESHOLD: f32 = 0.5;
const NMS_IOU_THRESHOLD: f32 = 0.4;
const STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// Scale + padding that fits the source frame into the square model input.
///
/// Padding is a whole number of pixels; the same offset places the content
/// in the tensor and maps detections back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn fit(src_w: usize, src_h: usize, target: usize) -> Self {
        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let pad = |src: usize| ((target as f32 - (src as f32 * scale).round()) / 2.0).floor();
        Self {
            scale,
            pad_x: pad(src_w),
            pad_y: pad(src_h),
        }
    }

    /// Model-input coordinates back to source-frame coordinates.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LevelOutputs {
    pub scores: usize,
    pub boxes: usize,
    /// Absent on exports without landmark heads.
    pub keypoints: Option<usize>,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    levels: [LevelOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, VisionError> {
        if !model_path.exists() {
            return Err(VisionError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(VisionError::InferenceFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                names.len()
            )));
        }

        let levels = map_level_outputs(&names);
        tracing::info!(path = %model_path.display(), outputs = ?names, ?levels, "loaded SCRFD model");

        Ok(Self { session, levels })
    }

    /// Detect faces in a grayscale frame, highest confidence first.
    pub fn detect(&mut self, gray: &[u8], width: u32, height: u32) -> Result<Vec<BoundingBox>, VisionError> {
        let (w, h) = (width as usize, height as usize);
        let letterbox = Letterbox::fit(w, h, INPUT_SIZE);
        let input = letterbox_tensor(gray, w, h, &letterbox);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (level, &stride) in self.levels.iter().zip(STRIDES.iter()) {
            let (_, scores) = outputs[level.scores]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[level.boxes]
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;

            let keypoints = match level.keypoints {
                Some(idx) => Some(
                    outputs[idx]
                        .try_extract_tensor::<f32>()
                        .map_err(|e| VisionError::InferenceFailed(format!("kps stride {stride}: {e}")))?
                        .1,
                ),
                None => None,
            };

            candidates.extend(decode_level(scores, boxes, keypoints, stride, &letterbox));
        }

        Ok(suppress(candidates, NMS_IOU_THRESHOLD))
    }
}

/// Resize `gray` into the letterboxed NCHW input tensor. Padding uses the
/// mean so it normalizes to zero.
fn letterbox_tensor(gray: &[u8], width: usize, height: usize, lb: &Letterbox) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));
    let content_w = (width as f32 * lb.scale).round();
    let content_h = (height as f32 * lb.scale).round();

    for ty in 0..INPUT_SIZE {
        for tx in 0..INPUT_SIZE {
            let cx = tx as f32 - lb.pad_x;
            let cy = ty as f32 - lb.pad_y;
            let pixel = if cx >= 0.0 && cy >= 0.0 && cx < content_w && cy < content_h {
                let sx = (cx + 0.5) / lb.scale - 0.5;
                let sy = (cy + 0.5) / lb.scale - 0.5;
                bilinear(gray, width, height, sx, sy)
            } else {
                PIXEL_MEAN
            };
            let v = (pixel - PIXEL_MEAN) / PIXEL_STD;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = v;
            }
        }
    }
    tensor
}

/// Find score/bbox/kps outputs per stride. Exports with `score_8`/`bbox_8`
/// style names are mapped by name; anything else uses the usual ordering
/// `[scores 8/16/32, bboxes 8/16/32, kps 8/16/32]`.
fn map_level_outputs(names: &[String]) -> [LevelOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let by_name: Option<Vec<LevelOutputs>> = STRIDES
        .iter()
        .map(|&s| {
            Some(LevelOutputs {
                scores: position("score", s)?,
                boxes: position("bbox", s)?,
                keypoints: position("kps", s),
            })
        })
        .collect();

    match by_name {
        Some(levels) => [levels[0], levels[1], levels[2]],
        None => {
            let has_kps = names.len() >= 9;
            [0, 1, 2].map(|i| LevelOutputs {
                scores: i,
                boxes: 3 + i,
                keypoints: has_kps.then_some(6 + i),
            })
        }
    }
}

/// Decode every anchor of one stride level above the score threshold.
fn decode_level(
    scores: &[f32],
    boxes: &[f32],
    keypoints: Option<&[f32]>,
    stride: usize,
    lb: &Letterbox,
) -> Vec<BoundingBox> {
    let grid_w = INPUT_SIZE / stride;
    let s = stride as f32;

    scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score > SCORE_THRESHOLD)
        .filter_map(|(idx, &score)| {
            let d = boxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / ANCHORS_PER_CELL;
            let ax = (cell % grid_w) as f32 * s;
            let ay = (cell / grid_w) as f32 * s;

            let (x1, y1) = lb.to_source(ax - d[0] * s, ay - d[1] * s);
            let (x2, y2) = lb.to_source(ax + d[2] * s, ay + d[3] * s);
            let landmarks = keypoints
                .and_then(|kps| kps.get(idx * 10..idx * 10 + 10))
                .map(|k| -> Landmarks {
                    std::array::from_fn(|i| lb.to_source(ax + k[2 * i] * s, ay + k[2 * i + 1] * s))
                });
            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression; result is sorted by confidence.
fn suppress(mut candidates: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection-over-union of two boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let iy = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = ix * iy;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence, landmarks: None }
    }

    #[test]
    fn test_iou() {
        let a = bbox(0.0, 0.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &bbox(20.0, 20.0, 10.0, 10.0, 1.0)), 0.0);
        // Overlap 5x10 = 50, union 150
        assert!((iou(&a, &bbox(5.0, 0.0, 10.0, 10.0, 1.0)) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_suppress_keeps_best_of_overlapping() {
        let kept = suppress(
            vec![
                bbox(5.0, 5.0, 100.0, 100.0, 0.8),
                bbox(200.0, 200.0, 50.0, 50.0, 0.7),
                bbox(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            NMS_IOU_THRESHOLD,
        );
        let scores: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn test_letterbox_maps_back_to_source() {
        let lb = Letterbox::fit(640, 480, INPUT_SIZE);
        assert_eq!(lb.scale, 1.0);
        assert_eq!(lb.pad_y, 80.0);
        let (x, y) = lb.to_source(100.0, 180.0);
        assert!((x - 100.0).abs() < 1e-4);
        assert!((y - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_letterbox_tensor_padding_is_zero() {
        let lb = Letterbox::fit(64, 32, INPUT_SIZE);
        let tensor = letterbox_tensor(&vec![200u8; 64 * 32], 64, 32, &lb);
        // Top rows are padding
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // Centre is content
        let expected = (200.0 - PIXEL_MEAN) / PIXEL_STD;
        assert!((tensor[[0, 1, INPUT_SIZE / 2, INPUT_SIZE / 2]] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_map_level_outputs_by_name() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let levels = map_level_outputs(&names);
        assert_eq!(levels[0], LevelOutputs { scores: 2, boxes: 0, keypoints: Some(1) });
        assert_eq!(levels[2], LevelOutputs { scores: 8, boxes: 6, keypoints: Some(7) });
    }

    #[test]
    fn test_map_level_outputs_positional() {
        let names: Vec<String> = (0..9).map(|i| format!("{}", 440 + i)).collect();
        let levels = map_level_outputs(&names);
        assert_eq!(levels[1], LevelOutputs { scores: 1, boxes: 4, keypoints: Some(7) });

        let boxes_only: Vec<String> = (0..6).map(|i| format!("{}", 440 + i)).collect();
        assert_eq!(map_level_outputs(&boxes_only)[2].keypoints, None);
    }

    #[test]
    fn test_decode_level_single_anchor() {
        let stride = 32;
        let cells = (INPUT_SIZE / stride) * (INPUT_SIZE / stride) * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; cells];
        let mut boxes = vec![0.0f32; cells * 4];

        // Anchor at grid cell (x=2, y=3), first anchor of that cell.
        let grid_w = INPUT_SIZE / stride;
        let idx = (3 * grid_w + 2) * ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        boxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let dets = decode_level(&scores, &boxes, None, stride, &lb);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].x, 2.0 * 32.0 - 32.0);
        assert_eq!(dets[0].y, 3.0 * 32.0 - 32.0);
        assert_eq!(dets[0].width, 64.0);
        assert_eq!(dets[0].confidence, 0.9);
        assert_eq!(dets[0].landmarks, None);
    }

    #[test]
    fn test_decode_level_landmarks() {
        let stride = 32;
        let cells = (INPUT_SIZE / stride) * (INPUT_SIZE / stride) * ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; cells];
        let boxes = vec![1.0f32; cells * 4];
        let mut kps = vec![0.0f32; cells * 10];

        // Anchor at grid cell (x=1, y=1), second anchor of that cell.
        let grid_w = INPUT_SIZE / stride;
        let idx = (grid_w + 1) * ANCHORS_PER_CELL + 1;
        scores[idx] = 0.8;
        kps[idx * 10..idx * 10 + 10]
            .copy_from_slice(&[-0.5, -0.5, 0.5, -0.5, 0.0, 0.0, -0.5, 0.5, 0.5, 0.5]);

        let lb = Letterbox { scale: 2.0, pad_x: 0.0, pad_y: 16.0 };
        let dets = decode_level(&scores, &boxes, Some(&kps), stride, &lb);
        let landmarks = dets[0].landmarks.unwrap();
        // Anchor (32, 32); left eye at (16, 16) in input -> (8, 0) in source.
        assert_eq!(landmarks[0], (8.0, 0.0));
        // Nose on the anchor: (32, 32) -> (16, 8).
        assert_eq!(landmarks[2], (16.0, 8.0));
    }

    #[test]
    fn test_odd_padding_maps_consistently() {
        let lb = Letterbox::fit(640, 479, INPUT_SIZE);
        assert_eq!(lb.pad_y, 80.0);

        // Source row 0 bright, rest dark.
        let mut gray = vec![0u8; 640 * 479];
        gray[..640].fill(255);
        let tensor = letterbox_tensor(&gray, 640, 479, &lb);

        // First content row is exactly the padding offset, and maps back to
        // source row 0.
        assert_eq!(tensor[[0, 0, 79, 100]], 0.0);
        assert!((tensor[[0, 0, 80, 100]] - (255.0 - PIXEL_MEAN) / PIXEL_STD).abs() < 1e-4);
        assert_eq!(lb.to_source(100.0, 80.0), (100.0, 0.0));
    }
}
