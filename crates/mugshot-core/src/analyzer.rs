//! Model seams: face analysis and face swapping.
//!
//! The pipeline only sees these traits. The ONNX implementations below are
//! built once at startup and handed to whoever drives the pipeline; tests
//! substitute fakes.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::swapper::{InSwapper, SwapperError};
use crate::types::DetectedFace;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in RGB images.
pub trait FaceAnalyzer {
    /// Boxes and landmarks only.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError>;

    /// Attach an identity embedding to one detected face.
    fn embed(&mut self, image: &RgbImage, face: DetectedFace) -> Result<DetectedFace, AnalyzerError>;
}

/// Replaces one face in an image with the identity of another.
pub trait FaceSwapper {
    /// Returns a new image with the same dimensions as `target`.
    fn swap(
        &mut self,
        target: &RgbImage,
        target_face: &DetectedFace,
        reference_face: &DetectedFace,
    ) -> Result<RgbImage, SwapperError>;
}

/// SCRFD detection plus ArcFace embedding, the buffalo_l pair.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceAnalyzer {
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, AnalyzerError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path)?,
            recognizer: FaceRecognizer::load(recognizer_path)?,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        Ok(self
            .detector
            .detect(image)?
            .into_iter()
            .map(|bbox| DetectedFace { bbox, embedding: None })
            .collect())
    }

    fn embed(&mut self, image: &RgbImage, face: DetectedFace) -> Result<DetectedFace, AnalyzerError> {
        let embedding = self.recognizer.extract(image, &face.bbox)?;
        Ok(DetectedFace { embedding: Some(embedding), ..face })
    }
}

impl FaceSwapper for InSwapper {
    fn swap(
        &mut self,
        target: &RgbImage,
        target_face: &DetectedFace,
        reference_face: &DetectedFace,
    ) -> Result<RgbImage, SwapperError> {
        let embedding = reference_face
            .embedding
            .as_ref()
            .ok_or(SwapperError::NoEmbedding)?;
        InSwapper::swap(self, target, &target_face.bbox, embedding)
    }
}
