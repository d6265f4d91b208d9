//! Grayscale frames: detection overlay and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::Path;
use warden_core::ports::Annotate;
use warden_core::BoundingBox;

/// JPEG quality for snapshots and the dashboard preview.
const JPEG_QUALITY: u8 = 85;

/// Overlay shade for a recognized face.
pub const SHADE_KNOWN: u8 = 255;
/// Overlay shade for an unknown face.
pub const SHADE_UNKNOWN: u8 = 0;

const BOX_THICKNESS: u32 = 2;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Build a frame from raw grayscale pixels.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        })
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    /// Draw a rectangle outline around `face` in the given shade.
    pub fn draw_box(&mut self, face: &BoundingBox, shade: u8) {
        let Some((x0, y0, x1, y1)) = face.pixel_bounds(self.width, self.height) else {
            return;
        };
        let w = self.width as usize;

        for t in 0..BOX_THICKNESS {
            // Horizontal edges
            for y in [y0 + t, y1.saturating_sub(1 + t)] {
                if y < y0 || y >= y1 {
                    continue;
                }
                let row = y as usize * w;
                self.data[row + x0 as usize..row + x1 as usize].fill(shade);
            }
            // Vertical edges
            for x in [x0 + t, x1.saturating_sub(1 + t)] {
                if x < x0 || x >= x1 {
                    continue;
                }
                for y in y0..y1 {
                    self.data[y as usize * w + x as usize] = shade;
                }
            }
        }
    }

    /// Encode as a grayscale JPEG.
    pub fn to_jpeg(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode(
            &self.data,
            self.width,
            self.height,
            ExtendedColorType::L8,
        )?;
        Ok(out)
    }

    /// Write the frame to `path` as a JPEG.
    pub fn save_jpeg(&self, path: &Path) -> Result<(), FrameError> {
        let bytes = self.to_jpeg()?;
        std::fs::write(path, bytes).map_err(FrameError::Io)
    }
}

impl Annotate for Frame {
    fn draw_detection(&mut self, face: &BoundingBox, known: bool) {
        let shade = if known { SHADE_KNOWN } else { SHADE_UNKNOWN };
        self.draw_box(face, shade);
    }
}

/// Luma plane of a packed YUYV buffer (`[Y0, U, Y1, V]` per pixel pair).
pub(crate) fn yuyv_luma(yuyv: &[u8]) -> Vec<u8> {
    yuyv.iter().step_by(2).copied().collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write frame: {0}")]
    Io(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_gray(vec![value; (width * height) as usize], width, height).unwrap()
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_yuyv_luma() {
        assert_eq!(yuyv_luma(&[100, 128, 200, 128]), vec![100, 200]);
    }

    #[test]
    fn test_from_gray_checks_length() {
        assert!(Frame::from_gray(vec![0; 5], 2, 2).is_err());
    }

    #[test]
    fn test_draw_box_outline_only() {
        let mut frame = gray(10, 10, 128);
        frame.draw_box(&bbox(2.0, 2.0, 6.0, 6.0), 255);

        // Corners and edges painted
        assert_eq!(frame.data[2 * 10 + 2], 255);
        assert_eq!(frame.data[7 * 10 + 7], 255);
        assert_eq!(frame.data[2 * 10 + 5], 255);
        // Interior untouched (box spans 2..8, thickness 2 → 4..6 is inside)
        assert_eq!(frame.data[5 * 10 + 5], 128);
        // Outside untouched
        assert_eq!(frame.data[0], 128);
        assert_eq!(frame.data[9 * 10 + 9], 128);
    }

    #[test]
    fn test_draw_box_clipped_to_frame() {
        let mut frame = gray(8, 8, 128);
        frame.draw_box(&bbox(-4.0, -4.0, 100.0, 100.0), 0);
        assert_eq!(frame.data[0], 0);
        assert_eq!(frame.data[63], 0);
        assert_eq!(frame.data[3 * 8 + 3], 128);
    }

    #[test]
    fn test_annotate_shades() {
        let mut frame = gray(10, 10, 128);
        frame.draw_detection(&bbox(0.0, 0.0, 4.0, 4.0), true);
        frame.draw_detection(&bbox(5.0, 5.0, 4.0, 4.0), false);
        assert_eq!(frame.data[0], SHADE_KNOWN);
        assert_eq!(frame.data[5 * 10 + 5], SHADE_UNKNOWN);
    }

    #[test]
    fn test_jpeg_roundtrip_dimensions() {
        let frame = gray(16, 8, 90);
        let jpeg = frame.to_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_avg_brightness() {
        assert_eq!(gray(4, 4, 100).avg_brightness(), 100.0);
    }
}
