use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unexpected HTTP response: {status} {reason}")]
    Transport { status: u16, reason: String },

    #[error("invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
}
