//! inswapper_128 face swapper via ONNX Runtime.
//!
//! The target face is aligned to a 128×128 crop, the reference identity is
//! projected through the model's embedding map, and the generated crop is
//! pasted back into the target frame with a feathered edge.

use crate::alignment::{self, SimilarityTransform};
use crate::types::{BoundingBox, Embedding};
use image::{Rgb, RgbImage};
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const INSWAPPER_INPUT_SIZE: u32 = 128;
const INSWAPPER_LATENT_DIM: usize = 512;
/// Width of the blend ramp at the crop border, in crop pixels.
const PASTE_FEATHER: f32 = 12.8;

#[derive(Error, Debug)]
pub enum SwapperError {
    #[error("model file not found: {0}; download inswapper_128.onnx")]
    ModelNotFound(String),
    #[error("embedding map not found: {0}; export the model's emap initializer as raw f32")]
    EmapNotFound(String),
    #[error("embedding map {path} has {actual} values, expected {expected}")]
    EmapSize {
        path: String,
        actual: usize,
        expected: usize,
    },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("reference face has no embedding")]
    NoEmbedding,
    #[error("swap output is {actual:?}, target is {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// inswapper-based face swapper.
pub struct InSwapper {
    session: Session,
    /// Row-major 512×512 projection from ArcFace space to the swapper latent.
    emap: Vec<f32>,
    /// True when the model declares the "source" input before "target".
    source_first: bool,
}

impl InSwapper {
    /// Load the inswapper model and its embedding map.
    ///
    /// The map is stored as the last graph initializer of `inswapper_128.onnx`;
    /// it is read here from a sidecar file of 512×512 little-endian f32 values.
    pub fn load(model_path: &str, emap_path: &str) -> Result<Self, SwapperError> {
        if !Path::new(model_path).exists() {
            return Err(SwapperError::ModelNotFound(model_path.to_string()));
        }
        if !Path::new(emap_path).exists() {
            return Err(SwapperError::EmapNotFound(emap_path.to_string()));
        }

        let emap = read_emap(emap_path)?;

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let input_names: Vec<String> =
            session.inputs().iter().map(|i| i.name().to_string()).collect();
        let source_first = input_names.first().is_some_and(|n| n == "source");

        tracing::info!(
            path = model_path,
            emap = emap_path,
            inputs = ?input_names,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded inswapper model"
        );

        Ok(Self { session, emap, source_first })
    }

    /// Replace `target_face` in `target` with the identity in `source`.
    ///
    /// The result has the same dimensions as `target`.
    pub fn swap(
        &mut self,
        target: &RgbImage,
        target_face: &BoundingBox,
        source: &Embedding,
    ) -> Result<RgbImage, SwapperError> {
        let landmarks = target_face.landmarks.as_ref().ok_or(SwapperError::NoLandmarks)?;
        let (crop, transform) = alignment::align_face(target, landmarks, INSWAPPER_INPUT_SIZE);

        let blob = preprocess(&crop);
        let latent = project_latent(&source.values, &self.emap)?;

        let blob_in = TensorRef::from_array_view(blob.view())?;
        let latent_in = TensorRef::from_array_view(latent.view())?;
        let outputs = if self.source_first {
            self.session.run(ort::inputs![latent_in, blob_in])?
        } else {
            self.session.run(ort::inputs![blob_in, latent_in])?
        };

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SwapperError::InferenceFailed(format!("swap output: {e}")))?;
        let fake = postprocess(raw, INSWAPPER_INPUT_SIZE)?;

        let result = paste_back(target, &fake, &transform);
        if result.dimensions() != target.dimensions() {
            return Err(SwapperError::DimensionMismatch {
                expected: target.dimensions(),
                actual: result.dimensions(),
            });
        }
        Ok(result)
    }
}

fn read_emap(path: &str) -> Result<Vec<f32>, SwapperError> {
    let bytes = std::fs::read(path)?;
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let expected = INSWAPPER_LATENT_DIM * INSWAPPER_LATENT_DIM;
    if values.len() != expected {
        return Err(SwapperError::EmapSize {
            path: path.to_string(),
            actual: values.len(),
            expected,
        });
    }
    Ok(values)
}

/// `normalize(embedding · emap)` as a 1×512 tensor.
fn project_latent(embedding: &[f32], emap: &[f32]) -> Result<Array2<f32>, SwapperError> {
    if embedding.len() != INSWAPPER_LATENT_DIM {
        return Err(SwapperError::InferenceFailed(format!(
            "expected {INSWAPPER_LATENT_DIM}-dim source embedding, got {}",
            embedding.len()
        )));
    }

    let mut latent = vec![0.0f32; INSWAPPER_LATENT_DIM];
    for (i, e) in embedding.iter().enumerate() {
        let row = &emap[i * INSWAPPER_LATENT_DIM..(i + 1) * INSWAPPER_LATENT_DIM];
        for (l, m) in latent.iter_mut().zip(row) {
            *l += e * m;
        }
    }
    let latent = crate::recognizer::l2_normalize(&latent);

    Array2::from_shape_vec((1, INSWAPPER_LATENT_DIM), latent)
        .map_err(|e| SwapperError::InferenceFailed(format!("latent shape: {e}")))
}

/// RGB crop → NCHW tensor scaled to [0, 1].
fn preprocess(crop: &RgbImage) -> Array4<f32> {
    let (w, h) = crop.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }
    tensor
}

/// NCHW [0, 1] output → RGB crop.
fn postprocess(raw: &[f32], size: u32) -> Result<RgbImage, SwapperError> {
    let plane = (size * size) as usize;
    if raw.len() != 3 * plane {
        return Err(SwapperError::InferenceFailed(format!(
            "expected {} output values, got {}",
            3 * plane,
            raw.len()
        )));
    }
    Ok(RgbImage::from_fn(size, size, |x, y| {
        let idx = (y * size + x) as usize;
        Rgb(std::array::from_fn(|c| {
            (raw[c * plane + idx].clamp(0.0, 1.0) * 255.0).round() as u8
        }))
    }))
}

/// Blend a generated crop back into the frame it was aligned from.
///
/// `transform` maps frame coordinates to crop coordinates. Pixels outside the
/// crop keep their original value; the crop border ramps from the original
/// to the generated pixels over [`PASTE_FEATHER`] crop pixels.
pub fn paste_back(target: &RgbImage, fake: &RgbImage, transform: &SimilarityTransform) -> RgbImage {
    let mut out = target.clone();
    let (width, height) = target.dimensions();
    let size = fake.width() as f32;
    let Some(inv) = transform.inverse() else {
        return out;
    };
    if width == 0 || height == 0 {
        return out;
    }

    // Frame-space bounds of the crop square.
    let corners = [(0.0, 0.0), (size, 0.0), (0.0, size), (size, size)].map(|(x, y)| inv.apply(x, y));
    let min_x = corners.iter().map(|c| c.0).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let min_y = corners.iter().map(|c| c.1).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let max_x = (corners.iter().map(|c| c.0).fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
        .clamp(0, width as i64 - 1) as u32;
    let max_y = (corners.iter().map(|c| c.1).fold(f32::NEG_INFINITY, f32::max).ceil() as i64)
        .clamp(0, height as i64 - 1) as u32;

    for y in min_y..=max_y.max(min_y).min(height - 1) {
        for x in min_x..=max_x.max(min_x).min(width - 1) {
            let (cx, cy) = transform.apply(x as f32, y as f32);
            let margin = cx.min(cy).min(size - 1.0 - cx).min(size - 1.0 - cy);
            if margin < 0.0 {
                continue;
            }
            let Some(generated) = alignment::sample_bilinear(fake, cx, cy) else {
                continue;
            };
            let weight = (margin / PASTE_FEATHER).clamp(0.0, 1.0);
            let original = *target.get_pixel(x, y);
            let blended: [u8; 3] = std::array::from_fn(|c| {
                (generated[c] * weight + original[c] as f32 * (1.0 - weight))
                    .round()
                    .clamp(0.0, 255.0) as u8
            });
            out.put_pixel(x, y, Rgb(blended));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paste_back_keeps_dimensions_and_outside_pixels() {
        let target = RgbImage::from_pixel(300, 200, Rgb([0, 0, 0]));
        let fake = RgbImage::from_pixel(128, 128, Rgb([255, 255, 255]));
        // Crop covers frame region (50..178, 40..168).
        let transform = SimilarityTransform { a: 1.0, b: 0.0, tx: -50.0, ty: -40.0 };

        let out = paste_back(&target, &fake, &transform);
        assert_eq!(out.dimensions(), (300, 200));
        // Far outside the crop: untouched.
        assert_eq!(out.get_pixel(5, 5), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(250, 190), &Rgb([0, 0, 0]));
        // Crop center: fully generated.
        assert_eq!(out.get_pixel(114, 104), &Rgb([255, 255, 255]));
        // Near the crop edge: partially blended.
        let edge = out.get_pixel(52, 104)[0];
        assert!(edge > 0 && edge < 255, "edge = {edge}");
    }

    #[test]
    fn test_paste_back_crop_partly_outside_frame() {
        let target = RgbImage::from_pixel(100, 100, Rgb([10, 10, 10]));
        let fake = RgbImage::from_pixel(128, 128, Rgb([200, 200, 200]));
        let transform = SimilarityTransform { a: 1.0, b: 0.0, tx: 60.0, ty: 60.0 };
        let out = paste_back(&target, &fake, &transform);
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.get_pixel(99, 99), &Rgb([10, 10, 10]));
        assert_eq!(out.get_pixel(30, 30), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_postprocess_planar_to_rgb() {
        let plane = 4 * 4;
        let mut raw = vec![0.0f32; 3 * plane];
        raw[..plane].fill(1.0); // R
        raw[2 * plane..].fill(0.5); // B
        let img = postprocess(&raw, 4).unwrap();
        assert_eq!(img.get_pixel(2, 3), &Rgb([255, 0, 128]));
    }

    #[test]
    fn test_postprocess_rejects_wrong_size() {
        assert!(matches!(
            postprocess(&[0.0; 10], 4),
            Err(SwapperError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_project_latent_identity_map_normalizes() {
        let mut emap = vec![0.0f32; INSWAPPER_LATENT_DIM * INSWAPPER_LATENT_DIM];
        for i in 0..INSWAPPER_LATENT_DIM {
            emap[i * INSWAPPER_LATENT_DIM + i] = 2.0;
        }
        let mut emb = vec![0.0f32; INSWAPPER_LATENT_DIM];
        emb[0] = 3.0;
        emb[1] = 4.0;
        let latent = project_latent(&emb, &emap).unwrap();
        assert_eq!(latent.shape(), &[1, INSWAPPER_LATENT_DIM]);
        assert!((latent[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((latent[[0, 1]] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_read_emap_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.emap");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let err = read_emap(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SwapperError::EmapSize { actual: 4, .. }));
    }
}
