//! Grayscale resampling shared by the detector and the embedder.

/// Bilinear sample of an 8-bit grayscale image at sub-pixel `(x, y)`,
/// clamping to the image edge.
pub(crate) fn bilinear(gray: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    if width == 0 || height == 0 {
        return 0.0;
    }
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |xx: usize, yy: usize| gray.get(yy * width + xx).copied().unwrap_or(0) as f32;

    let top = px(x0, y0) * (1.0 - fx) + px(x1, y0) * fx;
    let bottom = px(x0, y1) * (1.0 - fx) + px(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_image_stays_uniform() {
        let gray = vec![128u8; 100];
        for &(x, y) in &[(0.0, 0.0), (4.5, 3.25), (9.0, 9.0), (-3.0, 20.0)] {
            assert_eq!(bilinear(&gray, 10, 10, x, y), 128.0);
        }
    }

    #[test]
    fn test_interpolates_between_pixels() {
        // 2x1 image: 0, 100
        let gray = vec![0u8, 100];
        assert!((bilinear(&gray, 2, 1, 0.5, 0.0) - 50.0).abs() < 1e-4);
        assert!((bilinear(&gray, 2, 1, 0.25, 0.0) - 25.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_image() {
        assert_eq!(bilinear(&[], 0, 0, 1.0, 1.0), 0.0);
    }
}
