//! Face Substitution Engine: put the reference face on the largest target face.

use crate::analyzer::{AnalyzerError, FaceAnalyzer, FaceSwapper};
use crate::swapper::SwapperError;
use crate::types::largest_face;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubstitutionError {
    #[error("{} not found", .0.display())]
    AssetMissing(PathBuf),
    #[error("reference image {} unreadable: {reason}", .path.display())]
    AssetUnreadable { path: PathBuf, reason: String },
    #[error("No face detected in reference photo")]
    NoReferenceFace,
    #[error("No face in meme")]
    NoTargetFace,
    #[error("face analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("face swap failed: {0}")]
    Swap(#[from] SwapperError),
}

/// Swaps the face in a configured reference photo onto target images.
pub struct FaceSubstitution {
    reference_path: PathBuf,
}

impl FaceSubstitution {
    pub fn new(reference_path: impl Into<PathBuf>) -> Self {
        Self { reference_path: reference_path.into() }
    }

    pub fn reference_path(&self) -> &Path {
        &self.reference_path
    }

    /// Replace the largest face in `target` with the reference face.
    ///
    /// The reference photo is assumed to show one relevant face, so its first
    /// detection is used as-is. The output has `target`'s dimensions.
    pub fn swap(
        &self,
        analyzer: &mut impl FaceAnalyzer,
        swapper: &mut impl FaceSwapper,
        target: &RgbImage,
    ) -> Result<RgbImage, SubstitutionError> {
        let reference = self.load_reference()?;

        let first = analyzer
            .detect(&reference)?
            .into_iter()
            .next()
            .ok_or(SubstitutionError::NoReferenceFace)?;
        let reference_face = analyzer.embed(&reference, first)?;

        let target_faces = analyzer.detect(target)?;
        let target_face = largest_face(&target_faces).ok_or(SubstitutionError::NoTargetFace)?;

        tracing::debug!(
            target_faces = target_faces.len(),
            area = target_face.area(),
            "swapping largest target face"
        );

        let result = swapper.swap(target, target_face, &reference_face)?;
        if result.dimensions() != target.dimensions() {
            return Err(SwapperError::DimensionMismatch {
                expected: target.dimensions(),
                actual: result.dimensions(),
            }
            .into());
        }
        Ok(result)
    }

    fn load_reference(&self) -> Result<RgbImage, SubstitutionError> {
        if !self.reference_path.exists() {
            return Err(SubstitutionError::AssetMissing(self.reference_path.clone()));
        }
        image::open(&self.reference_path)
            .map(|img| img.to_rgb8())
            .map_err(|e| SubstitutionError::AssetUnreadable {
                path: self.reference_path.clone(),
                reason: e.to_string(),
            })
    }
}
