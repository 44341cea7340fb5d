//! Similarity-transform warps over RGB bitmaps.
//!
//! Used twice in the pipeline: to align detected faces onto the canonical
//! 112×112 ArcFace template, and to cut the square crop fed to the
//! landmark estimator.

use image::{Rgb, RgbImage};

/// ArcFace reference keypoints for a 112×112 output.
pub const REFERENCE_KEYPOINTS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// A 4-DOF similarity transform `dst = [a -b; b a] * src + t`,
/// stored as `[a, -b, tx, b, a, ty]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity(pub [f32; 6]);

impl Similarity {
    /// Uniform scale about the origin followed by a translation.
    pub fn scale_translate(scale: f32, tx: f32, ty: f32) -> Self {
        Self([scale, 0.0, tx, 0.0, scale, ty])
    }

    /// Map a destination point back into source coordinates.
    ///
    /// Returns `None` when the transform is degenerate.
    pub fn invert_point(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let [a, _, tx, b, _, ty] = self.0;
        let det = a * a + b * b;
        if det.abs() < 1e-12 {
            return None;
        }
        let ia = a / det;
        let ib = b / det;
        let dx = x - tx;
        let dy = y - ty;
        Some((ia * dx + ib * dy, -ib * dx + ia * dy))
    }
}

/// Least-squares similarity transform mapping `src` keypoints onto `dst`.
pub fn estimate_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Similarity {
    // Overdetermined system A * [a, b, tx, ty]^T = B, two rows per point:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb);
    Similarity([a, -b, tx, b, a, ty])
}

/// Gaussian elimination with partial pivoting on a 4×4 system.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: [[f32; 4]; 4], atb: [f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            // degenerate keypoints: fall back to identity
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    x
}

/// Warp `image` through `transform` into a square `out_size` bitmap.
///
/// Bilinear sampling; pixels that map outside the source are black.
pub fn warp_affine(image: &RgbImage, transform: &Similarity, out_size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut output = RgbImage::new(out_size, out_size);

    let sample = |x: i32, y: i32| -> [f32; 3] {
        if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
            let Rgb(p) = *image.get_pixel(x as u32, y as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    for (ox, oy, out) in output.enumerate_pixels_mut() {
        let Some((sx, sy)) = transform.invert_point(ox as f32, oy as f32) else {
            continue;
        };

        let x0 = sx.floor() as i32;
        let y0 = sy.floor() as i32;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let tl = sample(x0, y0);
        let tr = sample(x0 + 1, y0);
        let bl = sample(x0, y0 + 1);
        let br = sample(x0 + 1, y0 + 1);

        let mut px = [0u8; 3];
        for c in 0..3 {
            let v = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        *out = Rgb(px);
    }

    output
}

/// Align a face to the canonical 112×112 ArcFace crop using its five keypoints.
pub fn align_face(image: &RgbImage, keypoints: &[(f32, f32); 5]) -> RgbImage {
    let transform = estimate_similarity(keypoints, &REFERENCE_KEYPOINTS_112);
    warp_affine(image, &transform, ALIGNED_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_KEYPOINTS_112;
        let Similarity(m) = estimate_similarity(&pts, &pts);

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        // keypoints at 2x the reference scale
        let src = REFERENCE_KEYPOINTS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let Similarity(m) = estimate_similarity(&src, &REFERENCE_KEYPOINTS_112);
        assert!((m[0] - 0.5).abs() < 0.01, "a = {}, expected ~0.5", m[0]);
    }

    #[test]
    fn test_invert_point_roundtrip() {
        let t = Similarity::scale_translate(0.5, 10.0, -4.0);
        let (x, y) = t.invert_point(15.0, 1.0).unwrap();
        assert!((x - 10.0).abs() < 1e-5);
        assert!((y - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_invert_point_degenerate() {
        let t = Similarity([0.0; 6]);
        assert!(t.invert_point(1.0, 1.0).is_none());
    }

    #[test]
    fn test_warp_identity_preserves_pixels() {
        let image = RgbImage::from_fn(16, 16, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 7]));
        let out = warp_affine(&image, &Similarity::scale_translate(1.0, 0.0, 0.0), 16);
        assert_eq!(out.get_pixel(3, 5), &Rgb([30, 50, 7]));
        assert_eq!(out.dimensions(), (16, 16));
    }

    #[test]
    fn test_warp_out_of_bounds_is_black() {
        let image = RgbImage::from_pixel(8, 8, Rgb([200, 200, 200]));
        // shift the source far to the right of the output window
        let out = warp_affine(&image, &Similarity::scale_translate(1.0, 100.0, 0.0), 8);
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_align_face_output_size() {
        let image = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
        let aligned = align_face(&image, &REFERENCE_KEYPOINTS_112);
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_keypoint_lands_on_reference() {
        // Paint a bright patch at the left-eye keypoint and check it ends up
        // near the reference left-eye position after alignment.
        let mut image = RgbImage::new(200, 200);
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        for dy in 0..5u32 {
            for dx in 0..5u32 {
                image.put_pixel(78 + dx, 58 + dy, Rgb([255, 255, 255]));
            }
        }

        let aligned = align_face(&image, &src);

        let ref_x = REFERENCE_KEYPOINTS_112[0].0.round() as u32;
        let ref_y = REFERENCE_KEYPOINTS_112[0].1.round() as u32;
        let mut max_val = 0u8;
        for y in ref_y - 1..=ref_y + 1 {
            for x in ref_x - 1..=ref_x + 1 {
                max_val = max_val.max(aligned.get_pixel(x, y).0[0]);
            }
        }
        assert!(max_val > 100, "expected bright patch near ({ref_x}, {ref_y}), max={max_val}");
    }
}
