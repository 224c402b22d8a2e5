//! Face alignment via 4-DOF similarity transform.
//!
//! Maps five detected landmarks onto the insightface reference template,
//! producing square RGB crops for the recognizer (112×112) and the
//! swapper (128×128), and the transform needed to paste a crop back.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 crop.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Reference landmarks scaled to a crop of `size` pixels.
///
/// Multiples of 112 scale the template directly; other sizes are treated as
/// 128-based crops, which shift the template 8px right per 128px.
pub fn reference_landmarks(size: u32) -> [(f32, f32); 5] {
    let (ratio, diff_x) = if size % 112 == 0 {
        (size as f32 / 112.0, 0.0)
    } else {
        let ratio = size as f32 / 128.0;
        (ratio, 8.0 * ratio)
    };
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * ratio + diff_x, y * ratio))
}

/// Similarity transform `[a -b tx; b a ty]` from image space to crop space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    /// Least-squares estimate of the transform taking `src` onto `dst`.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        // Each pair (sx, sy) -> (dx, dy) contributes two rows:
        //   [sx, -sy, 1, 0] · [a, b, tx, ty] = dx
        //   [sy,  sx, 0, 1] · [a, b, tx, ty] = dy
        let mut ata = [0.0f32; 16];
        let mut atb = [0.0f32; 4];

        for ((sx, sy), (dx, dy)) in src.iter().copied().zip(dst.iter().copied()) {
            let r1 = [sx, -sy, 1.0, 0.0];
            let r2 = [sy, sx, 0.0, 1.0];
            for j in 0..4 {
                for k in 0..4 {
                    ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
                }
                atb[j] += r1[j] * dx + r2[j] * dy;
            }
        }

        let [a, b, tx, ty] = solve_4x4(&ata, &atb);
        Self { a, b, tx, ty }
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse transform, or `None` when the transform is degenerate.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        // Inverse translation: -R⁻¹ · t
        let tx = -(ia * self.tx - ib * self.ty);
        let ty = -(ib * self.tx + ia * self.ty);
        Some(Self { a: ia, b: ib, tx, ty })
    }
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&ata[i * 4..i * 4 + 4]);
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let max_row = (col..4)
            .max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))
            .unwrap_or(col);
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
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

/// Sample an RGB image at a sub-pixel position with bilinear interpolation.
///
/// Returns `None` outside the image.
pub fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Option<[f32; 3]> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let (tl, tr) = (image.get_pixel(x0, y0), image.get_pixel(x1, y0));
    let (bl, br) = (image.get_pixel(x0, y1), image.get_pixel(x1, y1));

    Some(std::array::from_fn(|c| {
        tl[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + tr[c] as f32 * fx * (1.0 - fy)
            + bl[c] as f32 * (1.0 - fx) * fy
            + br[c] as f32 * fx * fy
    }))
}

/// Warp the region selected by `transform` into a `size`×`size` crop.
///
/// Pixels that map outside the source are black.
pub fn warp_crop(image: &RgbImage, transform: &SimilarityTransform, size: u32) -> RgbImage {
    let mut out = RgbImage::new(size, size);
    let Some(inv) = transform.inverse() else {
        return out;
    };

    for (ox, oy, pixel) in out.enumerate_pixels_mut() {
        let (sx, sy) = inv.apply(ox as f32, oy as f32);
        if let Some(v) = sample_bilinear(image, sx, sy) {
            *pixel = Rgb(v.map(|c| c.round().clamp(0.0, 255.0) as u8));
        }
    }
    out
}

/// Align a detected face to a canonical `size`×`size` crop.
///
/// Returns the crop and the image→crop transform used to produce it.
pub fn align_face(
    image: &RgbImage,
    landmarks: &[(f32, f32); 5],
    size: u32,
) -> (RgbImage, SimilarityTransform) {
    let transform = SimilarityTransform::estimate(landmarks, &reference_landmarks(size));
    (warp_crop(image, &transform, size), transform)
}
