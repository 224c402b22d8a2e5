//! mugshot-core: Meme selection and face substitution.
//!
//! Ranks trending image posts, searches the feed for a meme with a large
//! face (SCRFD), and swaps a reference face into it (ArcFace + inswapper),
//! all running via ONNX Runtime on CPU. Network collaborators are traits;
//! see `mugshot-net` for the HTTP implementations.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod error;
pub mod locator;
pub mod pipeline;
pub mod ranker;
pub mod recognizer;
pub mod source;
pub mod store;
pub mod substitution;
pub mod swapper;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{AnalyzerError, FaceAnalyzer, FaceSwapper, OnnxFaceAnalyzer};
pub use error::UpstreamError;
pub use locator::{FaceLocator, ImageFetcher, ScanOptions, ScanReport};
pub use pipeline::{pick, Generated, Pipeline, PipelineError};
pub use ranker::{Ranker, SelectionModel};
pub use source::{CandidateSource, PostFeed};
pub use store::ArtifactStore;
pub use substitution::{FaceSubstitution, SubstitutionError};
pub use swapper::InSwapper;
pub use types::{BoundingBox, CandidatePost, DetectedFace, Embedding, RawPost};

/// Default location of insightface model files (`~/.insightface/models`).
pub fn default_model_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".insightface/models")
}
