use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight applied to the comment count when computing engagement.
pub const COMMENT_WEIGHT: f64 = 1.5;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Box area in pixels (width × height). Degenerate boxes report 0.
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Face embedding vector (512-dimensional for ArcFace w600k_r50).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// L2-normalized values.
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

/// A face found by the analyzer: box, landmarks and (when the recognizer
/// ran) the identity embedding. Produced per detection call and never cached.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub embedding: Option<Embedding>,
}

impl DetectedFace {
    pub fn area(&self) -> f32 {
        self.bbox.area()
    }
}

/// Pick the face with the largest box area. Ties go to the first face seen.
pub fn largest_face(faces: &[DetectedFace]) -> Option<&DetectedFace> {
    faces.iter().fold(None, |best: Option<&DetectedFace>, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(face),
    })
}

/// A post as delivered by a feed, before admissibility filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub title: String,
    pub url: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_at: DateTime<Utc>,
    pub over_18: bool,
}

/// An image post eligible for ranking or face search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePost {
    /// Platform tag, e.g. "Reddit".
    pub source: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub comments: i64,
    pub created_at: DateTime<Utc>,
    /// Set by the ranker on the candidate it selects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_reason: Option<String>,
}

impl CandidatePost {
    pub fn from_raw(source: &str, raw: RawPost) -> Self {
        Self {
            source: source.to_string(),
            title: raw.title,
            url: raw.url,
            score: raw.score,
            comments: raw.num_comments,
            created_at: raw.created_at,
            selection_reason: None,
        }
    }

    /// Engagement heuristic: `score + 1.5 × comments`.
    ///
    /// Recomputed on demand so ranking depends on score and comments only.
    pub fn engagement(&self) -> f64 {
        self.score as f64 + self.comments as f64 * COMMENT_WEIGHT
    }

    /// Copy of this candidate carrying a selection reason.
    pub fn with_reason(&self, reason: impl Into<String>) -> Self {
        Self {
            selection_reason: Some(reason.into()),
            ..self.clone()
        }
    }
}

/// Raster extensions the pipeline accepts (compared case-insensitively).
const IMAGE_EXTENSIONS: [&str; 2] = [".jpg", ".png"];

/// True when the URL ends in a supported raster extension.
pub fn is_image_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}
