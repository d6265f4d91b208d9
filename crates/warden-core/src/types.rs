use serde::{Deserialize, Serialize};
use std::fmt;

/// Default maximum Euclidean distance for a positive match.
///
/// Embeddings are unit length, so distance `d` corresponds to cosine
/// similarity `1 - d²/2`; 1.10 accepts pairs with cosine above ~0.40.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.10;

/// Five facial landmarks: left eye, right eye, nose, left and right mouth
/// corner, in frame pixel coordinates.
pub type Landmarks = [(f32, f32); 5];

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Present when the detector regresses keypoints.
    #[serde(default)]
    pub landmarks: Option<Landmarks>,
}

impl BoundingBox {
    /// Clamp the box to integer pixel bounds `(x0, y0, x1, y1)` inside a
    /// `width`×`height` frame. Returns `None` when nothing of it is visible.
    pub fn pixel_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(height);
        if x0 >= x1 || y0 >= y1 {
            None
        } else {
            Some((x0, y0, x1, y1))
        }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default)]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two embeddings.
    ///
    /// # Panics
    ///
    /// Panics if the embeddings differ in length. Every embedding in a
    /// running system comes from the same extractor, so a mismatch is a
    /// broken input contract rather than a recoverable condition.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        assert_eq!(
            self.values.len(),
            other.values.len(),
            "embedding dimensionality mismatch"
        );
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Scale to unit L2 norm. A zero vector is returned unchanged.
    pub fn normalized(mut self) -> Self {
        let norm = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            self.values.iter_mut().for_each(|v| *v /= norm);
        }
        self
    }

    /// Unit-length element-wise mean of several embeddings of the same
    /// length.
    ///
    /// Averaging unit vectors shortens them, so the mean is renormalized to
    /// stay comparable with single-frame embeddings. Returns `None` for an empty
    /// slice. The model version is kept only when every sample agrees on it.
    pub fn mean(samples: &[Embedding]) -> Option<Embedding> {
        let first = samples.first()?;
        let dim = first.values.len();
        let mut acc = vec![0.0f32; dim];
        for sample in samples {
            assert_eq!(sample.values.len(), dim, "embedding dimensionality mismatch");
            for (a, v) in acc.iter_mut().zip(&sample.values) {
                *a += v;
            }
        }
        let n = samples.len() as f32;
        acc.iter_mut().for_each(|a| *a /= n);

        let model_version = first.model_version.clone().filter(|version| {
            samples
                .iter()
                .all(|s| s.model_version.as_deref() == Some(version.as_str()))
        });

        Some(
            Embedding {
                values: acc,
                model_version,
            }
            .normalized(),
        )
    }
}

/// A named, enrolled face. One embedding per name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledIdentity {
    pub name: String,
    #[serde(flatten)]
    pub embedding: Embedding,
}

/// A face found in one processed frame.
#[derive(Debug, Clone)]
pub struct Detection {
    pub face: BoundingBox,
    pub embedding: Embedding,
}

/// Who a candidate was classified as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(name) => f.write_str(name),
            Identity::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Result of matching a candidate embedding against the enrolled gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    /// Distance to the nearest enrolled embedding, `f32::INFINITY` when the
    /// gallery is empty.
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown() -> Self {
        Self {
            identity: Identity::Unknown,
            distance: f32::INFINITY,
        }
    }
}

/// Strategy for comparing a candidate embedding against the enrolled gallery.
pub trait Matcher {
    fn compare(&self, candidate: &Embedding, enrolled: &[EnrolledIdentity], threshold: f32) -> MatchResult;
}

/// Nearest-neighbour matcher over Euclidean distance.
///
/// The nearest entry wins (first one on ties) and is accepted only when its
/// distance is within `threshold`.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, candidate: &Embedding, enrolled: &[EnrolledIdentity], threshold: f32) -> MatchResult {
        if enrolled.is_empty() {
            return MatchResult::unknown();
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx = 0usize;

        for (i, identity) in enrolled.iter().enumerate() {
            let dist = candidate.euclidean_distance(&identity.embedding);
            // Strict compare keeps the first of equal distances.
            if i == 0 || dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }

        let identity = if best_dist <= threshold {
            Identity::Known(enrolled[best_idx].name.clone())
        } else {
            Identity::Unknown
        };

        MatchResult {
            identity,
            distance: best_dist,
        }
    }
}
