use std::path::PathBuf;

/// A staged file could not be read for sending.
#[derive(Debug, thiserror::Error)]
#[error("failed to read attachment {}: {source}", .path.display())]
pub struct EncodingError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failure of a solve call. These are for diagnostics only; the user always
/// sees the same fixed apology.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    #[error("API key not configured")]
    CredentialMissing,
    #[error("request failed: {0}")]
    Request(String),
    #[error("malformed response: {0}")]
    ResponseShape(String),
    #[error("attachment type not supported: {0}")]
    UnsupportedAttachment(String),
}

impl From<reqwest::Error> for SolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SolveError::Request(format!("timeout: {err}"))
        } else if err.is_connect() {
            SolveError::Request(format!("connection failed: {err}"))
        } else if err.is_decode() {
            SolveError::ResponseShape(err.to_string())
        } else {
            SolveError::Request(err.to_string())
        }
    }
}
