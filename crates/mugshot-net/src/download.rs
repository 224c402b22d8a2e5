//! Image download with a bounded timeout.

use crate::upstream;
use mugshot_core::{ImageFetcher, UpstreamError};
use reqwest::blocking::Client;
use std::time::Duration;

const SERVICE: &str = "image host";
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Larger bodies are rejected rather than decoded.
const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;

pub struct ImageDownloader {
    http: Client,
}

impl ImageDownloader {
    pub fn new(user_agent: &str, timeout: Duration) -> reqwest::Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

impl ImageFetcher for ImageDownloader {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, UpstreamError> {
        let response = self
            .http
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| upstream(SERVICE, e))?;

        if let Some(len) = response.content_length().filter(|&l| l as usize > MAX_IMAGE_BYTES) {
            return Err(oversized(len as usize));
        }

        let bytes = response.bytes().map_err(|e| upstream(SERVICE, e))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(oversized(bytes.len()));
        }
        tracing::trace!(url, bytes = bytes.len(), "downloaded image");
        Ok(bytes.to_vec())
    }
}

fn oversized(len: usize) -> UpstreamError {
    UpstreamError::Malformed {
        service: SERVICE,
        reason: format!("image of {len} bytes exceeds {MAX_IMAGE_BYTES}"),
    }
}
