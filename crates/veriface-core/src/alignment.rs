//! Face alignment via 4-DOF similarity transform.
//!
//! Aligns detected faces to a canonical 112x112 RGB crop using the five
//! InsightFace reference landmarks and least-squares estimation. Regions
//! without landmarks fall back to a deterministic square crop.

use crate::types::{FaceRegion, NormalizedImage};

/// ArcFace reference landmarks for a 112x112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Side length of the aligned RGB crop fed to the embedding model.
pub const ALIGNED_SIZE: usize = 112;

/// Produces the canonical 112x112 RGB crop for a detected face.
///
/// With landmarks: similarity-transform warp to the reference layout.
/// Without: square crop around the box center, bilinearly resized. Both paths
/// are deterministic for identical inputs.
pub fn aligned_face_crop(image: &NormalizedImage, region: &FaceRegion) -> Vec<u8> {
    match &region.landmarks {
        Some(landmarks) => {
            let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
            warp_affine_rgb(image, &matrix, ALIGNED_SIZE)
        }
        None => crop_square_rgb(image, region, ALIGNED_SIZE),
    }
}

/// Estimate a 2x3 similarity transform (4-DOF: scale, rotation, translation)
/// from `src` landmarks to `dst` landmarks using least-squares.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Overdetermined system A * [a, b, tx, ty]^T = B, two rows per point pair:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [0.0f32; 16]; // 4x4, row-major
    let mut atb = [0.0f32; 4];

    for i in 0..5 {
        let (sx, sy) = src[i];
        let (dx, dy) = dst[i];

        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let x = solve_4x4(&ata, &atb);
    let (a, b, tx, ty) = (x[0], x[1], x[2], x[3]);

    [a, -b, tx, b, a, ty]
}

/// Solve a 4x4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    // Augmented matrix [A | b] as 4x5
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        for j in 0..4 {
            m[i][j] = ata[i * 4 + j];
        }
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0]; // degenerate: identity-ish
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

/// Apply a 2x3 similarity warp producing an `out_size` square RGB image.
///
/// Bilinear interpolation; out-of-bounds samples fill with black.
fn warp_affine_rgb(image: &NormalizedImage, matrix: &[f32; 6], out_size: usize) -> Vec<u8> {
    let src_width = image.width() as usize;
    let src_height = image.height() as usize;
    let pixels = image.pixels();

    let (a, _neg_b, tx) = (matrix[0], matrix[1], matrix[2]);
    let (b, _a2, ty) = (matrix[3], matrix[4], matrix[5]);

    // Invert the 2x2 part: M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return vec![0u8; out_size * out_size * 3];
    }
    let inv_det = 1.0 / det;
    let ia = a * inv_det;
    let ib = b * inv_det;

    let mut output = vec![0u8; out_size * out_size * 3];

    for oy in 0..out_size {
        for ox in 0..out_size {
            // Map output pixel back to source: src = M_inv * (dst - t)
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let x1 = x0 + 1;
            let y1 = y0 + 1;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let sample = |x: i32, y: i32, c: usize| -> f32 {
                if x >= 0 && x < src_width as i32 && y >= 0 && y < src_height as i32 {
                    pixels[(y as usize * src_width + x as usize) * 3 + c] as f32
                } else {
                    0.0
                }
            };

            let out_idx = (oy * out_size + ox) * 3;
            for c in 0..3 {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y1, c) * (1.0 - fx) * fy
                    + sample(x1, y1, c) * fx * fy;
                output[out_idx + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

/// Square crop around the region center, bilinearly resized to `out_size`.
///
/// The crop side is the larger box dimension; the sampling window is clamped
/// to the image so edge faces stay usable.
fn crop_square_rgb(image: &NormalizedImage, region: &FaceRegion, out_size: usize) -> Vec<u8> {
    let src_width = image.width() as f32;
    let src_height = image.height() as f32;
    let pixels = image.pixels();
    let width = image.width() as usize;

    let side = region.width.max(region.height).max(1.0);
    let cx = region.x + region.width / 2.0;
    let cy = region.y + region.height / 2.0;

    let left = (cx - side / 2.0).clamp(0.0, (src_width - 1.0).max(0.0));
    let top = (cy - side / 2.0).clamp(0.0, (src_height - 1.0).max(0.0));
    let side_x = side.min(src_width - left);
    let side_y = side.min(src_height - top);

    let mut output = vec![0u8; out_size * out_size * 3];
    let step_x = side_x / out_size as f32;
    let step_y = side_y / out_size as f32;

    for oy in 0..out_size {
        let sy = top + (oy as f32 + 0.5) * step_y - 0.5;
        let y0 = (sy.floor() as i32).clamp(0, image.height() as i32 - 1) as usize;
        let y1 = (y0 + 1).min(image.height() as usize - 1);
        let fy = (sy - sy.floor()).clamp(0.0, 1.0);

        for ox in 0..out_size {
            let sx = left + (ox as f32 + 0.5) * step_x - 0.5;
            let x0 = (sx.floor() as i32).clamp(0, image.width() as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (sx - sx.floor()).clamp(0.0, 1.0);

            let out_idx = (oy * out_size + ox) * 3;
            for c in 0..3 {
                let tl = pixels[(y0 * width + x0) * 3 + c] as f32;
                let tr = pixels[(y0 * width + x1) * 3 + c] as f32;
                let bl = pixels[(y1 * width + x0) * 3 + c] as f32;
                let br = pixels[(y1 * width + x1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                output[out_idx + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}
