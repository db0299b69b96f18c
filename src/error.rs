//! Pelican error types

/// Pelican error types
#[derive(Debug, thiserror::Error)]
pub enum PelicanError {
    // Routing errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The federation discovery document could not be fetched or lacks a
    /// required field.
    #[error("invalid federation metadata: {0}")]
    InvalidMetadata(String),

    /// The director answered without the routing headers we need.
    #[error("bad director response: {0}")]
    BadDirectorResponse(String),

    /// Every candidate was exhausted, or the director had no location to offer.
    #[error("no available source: {0}")]
    NoAvailableSource(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    // Transfer errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

impl PelicanError {
    /// Whether this error was produced by the routing layer itself (discovery,
    /// probing, path handling) rather than by a transfer backend.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            PelicanError::Configuration(_)
                | PelicanError::InvalidMetadata(_)
                | PelicanError::BadDirectorResponse(_)
                | PelicanError::NoAvailableSource(_)
                | PelicanError::InvalidPath(_)
        )
    }
}

impl From<reqwest::Error> for PelicanError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        if err.is_timeout() {
            PelicanError::Timeout(url)
        } else if let Some(status) = err.status() {
            PelicanError::Status {
                status: status.as_u16(),
                url,
            }
        } else {
            PelicanError::Http(err.to_string())
        }
    }
}

/// Result type alias for Pelican operations
pub type Result<T> = std::result::Result<T, PelicanError>;
