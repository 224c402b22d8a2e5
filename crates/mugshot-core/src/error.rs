use thiserror::Error;

/// Failure talking to an external service (feed, image host, language model).
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },
    #[error("{service} timed out")]
    Timeout { service: &'static str },
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("malformed response from {service}: {reason}")]
    Malformed { service: &'static str, reason: String },
}

impl UpstreamError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Unavailable { service, .. }
            | Self::Timeout { service }
            | Self::Status { service, .. }
            | Self::Malformed { service, .. } => service,
        }
    }
}
