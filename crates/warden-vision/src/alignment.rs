//! Five-point face alignment onto the ArcFace template.
//!
//! A 4-DOF similarity (scale, rotation, translation) is fitted from the
//! detected landmarks to the template by least squares, then the 112x112
//! input is resampled through its inverse.

use warden_core::types::Landmarks;

/// ArcFace landmark template for a 112x112 crop.
pub(crate) const TEMPLATE_112: Landmarks = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// `x' = a·x − b·y + tx`, `y' = b·x + a·y + ty`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    /// Least-squares similarity taking `src` onto `dst`. `None` when the
    /// source points are all coincident.
    pub fn estimate(src: &Landmarks, dst: &Landmarks) -> Option<Self> {
        let n = src.len() as f32;
        let centroid = |pts: &Landmarks| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (smx, smy) = centroid(src);
        let (dmx, dmy) = centroid(dst);

        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        let mut spread = 0.0f32;
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst) {
            let (sx, sy) = (sx - smx, sy - smy);
            let (dx, dy) = (dx - dmx, dy - dmy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            spread += sx * sx + sy * sy;
        }
        if spread < 1e-6 {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: dmx - (a * smx - b * smy),
            ty: dmy - (b * smx + a * smy),
        })
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Map a point from the target space back to the source space.
    pub fn invert(&self, x: f32, y: f32) -> (f32, f32) {
        let det = self.a * self.a + self.b * self.b;
        let (dx, dy) = (x - self.tx, y - self.ty);
        (
            (self.a * dx + self.b * dy) / det,
            (self.a * dy - self.b * dx) / det,
        )
    }
}
