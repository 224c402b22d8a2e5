//! Pipeline Orchestrator.
//!
//! `generate` runs Face Locator → Face Substitution Engine → artifact store.
//! `pick` runs Candidate Source → Ranker. The two are independent: the face
//! swap always targets the face-search result, since the ranked pick carries
//! no guarantee of containing a face.

use crate::analyzer::{FaceAnalyzer, FaceSwapper};
use crate::error::UpstreamError;
use crate::locator::{FaceLocator, ImageFetcher, ScanReport};
use crate::ranker::{Ranker, SelectionModel};
use crate::source::{CandidateSource, PostFeed};
use crate::store::{Artifact, ArtifactStore, StoreError};
use crate::substitution::{FaceSubstitution, SubstitutionError};
use crate::types::CandidatePost;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No suitable meme with face found")]
    NotFound,
    #[error("{0}")]
    Upstream(#[from] UpstreamError),
    #[error("{0}")]
    Substitution(#[from] SubstitutionError),
    #[error("saving output failed: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// "No result" is an expected outcome, not a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Output of one successful `generate`.
#[derive(Debug, Clone)]
pub struct Generated {
    pub artifact: Artifact,
    pub post: CandidatePost,
    /// Posts inspected before the match, including the match itself.
    pub inspected: usize,
}

pub struct Pipeline<F, D, A, S> {
    locator: FaceLocator<F, D>,
    substitution: FaceSubstitution,
    analyzer: A,
    swapper: S,
    store: ArtifactStore,
}

impl<F, D, A, S> Pipeline<F, D, A, S>
where
    F: PostFeed,
    D: ImageFetcher,
    A: FaceAnalyzer,
    S: FaceSwapper,
{
    pub fn new(
        locator: FaceLocator<F, D>,
        substitution: FaceSubstitution,
        analyzer: A,
        swapper: S,
        store: ArtifactStore,
    ) -> Self {
        Self { locator, substitution, analyzer, swapper, store }
    }

    /// Find a meme with a face, swap in the reference face, persist the result.
    ///
    /// Nothing is written unless the swap succeeds. No automatic retries.
    pub fn generate(&mut self) -> Result<Generated, PipelineError> {
        let report: ScanReport = self.locator.find_with_face(&mut self.analyzer)?;
        let inspected = report.entries.len();
        let found = report.found.ok_or(PipelineError::NotFound)?;

        let swapped = self
            .substitution
            .swap(&mut self.analyzer, &mut self.swapper, &found.image)?;
        let artifact = self.store.save(&swapped)?;

        tracing::info!(
            title = %found.post.title,
            score = found.post.score,
            file = %artifact.filename,
            inspected,
            "generated meme"
        );

        Ok(Generated { artifact, post: found.post, inspected })
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

/// Fetch up to `limit` candidates and let the ranker choose one.
///
/// `Ok(None)` means the feed had no admissible candidates.
pub fn pick<F: PostFeed, M: SelectionModel>(
    source: &mut CandidateSource<F>,
    ranker: &Ranker<M>,
    limit: usize,
) -> Result<Option<CandidatePost>, UpstreamError> {
    let candidates = source.fetch(limit)?;
    Ok(ranker.pick_best(&candidates))
}
