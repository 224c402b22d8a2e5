//! Face Locator: first trending post whose image holds a large enough face.
//!
//! Scans the feed in platform order (not re-ranked). Each inspected post gets
//! a [`ScanOutcome`]; a bad post is recorded and skipped, never fatal.

use crate::analyzer::FaceAnalyzer;
use crate::error::UpstreamError;
use crate::source::PostFeed;
use crate::types::{is_image_url, CandidatePost, DetectedFace, RawPost};
use image::RgbImage;

pub const DEFAULT_SCAN_LIMIT: usize = 50;
pub const DEFAULT_SCAN_MIN_SCORE: i64 = 500;
pub const DEFAULT_MIN_FACE_AREA: f32 = 10_000.0;

/// Downloads image bytes. Implementations bound each request with a timeout.
pub trait ImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, UpstreamError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Maximum raw posts inspected.
    pub scan_limit: usize,
    /// Posts scoring below this are skipped.
    pub min_score: i64,
    /// Minimum bounding-box area (px²) of the qualifying face.
    pub min_face_area: f32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            scan_limit: DEFAULT_SCAN_LIMIT,
            min_score: DEFAULT_SCAN_MIN_SCORE,
            min_face_area: DEFAULT_MIN_FACE_AREA,
        }
    }
}

/// Why a post was passed over.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotAnImage,
    Nsfw,
    BelowScore { score: i64 },
    Download(String),
    Decode(String),
    Detection(String),
    NoFace,
    FaceTooSmall { largest_area: f32 },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnImage => write!(f, "not an image"),
            Self::Nsfw => write!(f, "nsfw"),
            Self::BelowScore { score } => write!(f, "score {score} below minimum"),
            Self::Download(e) => write!(f, "download failed: {e}"),
            Self::Decode(e) => write!(f, "decode failed: {e}"),
            Self::Detection(e) => write!(f, "detection failed: {e}"),
            Self::NoFace => write!(f, "no face"),
            Self::FaceTooSmall { largest_area } => write!(f, "largest face {largest_area:.0}px² too small"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Accepted { face_area: f32 },
    Skipped(SkipReason),
}

/// One inspected post.
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub title: String,
    pub url: String,
    pub outcome: ScanOutcome,
}

/// A post whose image passed the face gate, with its decoded pixels.
#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub image: RgbImage,
    pub post: CandidatePost,
    pub faces: Vec<DetectedFace>,
}

/// Everything a scan looked at, and the match if there was one.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries: Vec<ScanEntry>,
    pub found: Option<FaceMatch>,
}

impl ScanReport {
    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, ScanOutcome::Skipped(_)))
            .count()
    }
}

pub struct FaceLocator<F, D> {
    feed: F,
    fetcher: D,
    options: ScanOptions,
}

impl<F: PostFeed, D: ImageFetcher> FaceLocator<F, D> {
    pub fn new(feed: F, fetcher: D, options: ScanOptions) -> Self {
        Self { feed, fetcher, options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan up to `scan_limit` posts and stop at the first qualifying face.
    ///
    /// Only the feed request itself can fail; an exhausted scan is a report
    /// with `found: None`.
    pub fn find_with_face(
        &mut self,
        analyzer: &mut impl FaceAnalyzer,
    ) -> Result<ScanReport, UpstreamError> {
        let posts = self.feed.hot(self.options.scan_limit)?;
        let platform = self.feed.platform().to_string();
        let mut report = ScanReport::default();

        for raw in posts.into_iter().take(self.options.scan_limit) {
            let title = raw.title.clone();
            let url = raw.url.clone();

            match self.inspect(raw, &platform, analyzer) {
                Ok(found) => {
                    let face_area = found.faces.iter().map(DetectedFace::area).fold(0.0, f32::max);
                    tracing::info!(title = %title, face_area, "found meme with face");
                    report.entries.push(ScanEntry {
                        title,
                        url,
                        outcome: ScanOutcome::Accepted { face_area },
                    });
                    report.found = Some(found);
                    return Ok(report);
                }
                Err(reason) => {
                    tracing::debug!(title = %title, url = %url, %reason, "skipped candidate");
                    report.entries.push(ScanEntry {
                        title,
                        url,
                        outcome: ScanOutcome::Skipped(reason),
                    });
                }
            }
        }

        tracing::info!(inspected = report.entries.len(), "no meme with a large enough face");
        Ok(report)
    }

    fn inspect(
        &self,
        raw: RawPost,
        platform: &str,
        analyzer: &mut impl FaceAnalyzer,
    ) -> Result<FaceMatch, SkipReason> {
        if !is_image_url(&raw.url) {
            return Err(SkipReason::NotAnImage);
        }
        if raw.over_18 {
            return Err(SkipReason::Nsfw);
        }
        if raw.score < self.options.min_score {
            return Err(SkipReason::BelowScore { score: raw.score });
        }

        let bytes = self
            .fetcher
            .fetch(&raw.url)
            .map_err(|e| SkipReason::Download(e.to_string()))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| SkipReason::Decode(e.to_string()))?
            .to_rgb8();
        let faces = analyzer
            .detect(&image)
            .map_err(|e| SkipReason::Detection(e.to_string()))?;

        let largest_area = faces.iter().map(DetectedFace::area).fold(None, |best: Option<f32>, a| {
            Some(best.map_or(a, |b| b.max(a)))
        });
        match largest_area {
            None => Err(SkipReason::NoFace),
            Some(area) if area < self.options.min_face_area => {
                Err(SkipReason::FaceTooSmall { largest_area: area })
            }
            Some(_) => Ok(FaceMatch {
                image,
                post: CandidatePost::from_raw(platform, raw),
                faces,
            }),
        }
    }
}
