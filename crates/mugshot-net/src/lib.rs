//! mugshot-net: Blocking HTTP collaborators for the meme pipeline.
//!
//! Implements the `mugshot-core` network traits: the Reddit hot feed
//! ([`PostFeed`](mugshot_core::PostFeed)), image download
//! ([`ImageFetcher`](mugshot_core::ImageFetcher)) and the xAI chat model used
//! for re-ranking ([`SelectionModel`](mugshot_core::SelectionModel)).

pub mod download;
pub mod reddit;
pub mod xai;

pub use download::ImageDownloader;
pub use reddit::{RedditCredentials, RedditFeed};
pub use xai::XaiClient;

use mugshot_core::UpstreamError;

/// Classify a reqwest failure for `service`.
pub(crate) fn upstream(service: &'static str, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout { service }
    } else if let Some(status) = err.status() {
        UpstreamError::Status { service, status: status.as_u16() }
    } else if err.is_decode() {
        UpstreamError::Malformed { service, reason: err.to_string() }
    } else {
        UpstreamError::Unavailable { service, reason: err.to_string() }
    }
}
