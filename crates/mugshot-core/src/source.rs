//! Candidate Source: admissible image posts from a trending feed.

use crate::error::UpstreamError;
use crate::types::{is_image_url, CandidatePost, RawPost};

/// Default engagement floor for ranked candidates.
pub const DEFAULT_MIN_SCORE: i64 = 200;

/// A "hot" listing over one or more named channels, in platform order.
pub trait PostFeed {
    /// Platform tag stamped on every candidate (e.g. "Reddit").
    fn platform(&self) -> &str;

    /// Up to `limit` posts. No retries; failures surface to the caller.
    fn hot(&mut self, limit: usize) -> Result<Vec<RawPost>, UpstreamError>;
}

/// Fetches and filters candidates for ranking.
pub struct CandidateSource<F> {
    feed: F,
    min_score: i64,
}

impl<F: PostFeed> CandidateSource<F> {
    pub fn new(feed: F) -> Self {
        Self { feed, min_score: DEFAULT_MIN_SCORE }
    }

    pub fn with_min_score(mut self, min_score: i64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Up to `limit` admissible candidates, highest engagement first.
    ///
    /// Pulls `2 × limit` raw posts so filtering still leaves enough to rank.
    pub fn fetch(&mut self, limit: usize) -> Result<Vec<CandidatePost>, UpstreamError> {
        let limit = limit.max(1);
        let raw = self.feed.hot(limit.saturating_mul(2))?;
        let pulled = raw.len();
        let platform = self.feed.platform().to_string();

        let mut candidates: Vec<CandidatePost> = raw
            .into_iter()
            .filter(|p| is_admissible(p, self.min_score))
            .map(|p| CandidatePost::from_raw(&platform, p))
            .collect();

        // Stable sort: equal engagement keeps feed order.
        candidates.sort_by(|a, b| b.engagement().total_cmp(&a.engagement()));
        candidates.truncate(limit);

        tracing::debug!(pulled, kept = candidates.len(), "candidate source fetched");
        Ok(candidates)
    }
}

/// Image URL, safe for work, and score strictly above `min_score`.
pub fn is_admissible(post: &RawPost, min_score: i64) -> bool {
    is_image_url(&post.url) && !post.over_18 && post.score > min_score
}
