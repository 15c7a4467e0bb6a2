use thiserror::Error;

/// Failure of the HTTP collaborator itself (connection, TLS, timeout).
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] attohttpc::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("access denied by metadata endpoint")]
    AccessDenied,
    #[error("network error: {0}")]
    Network(String),
    /// No picture published for today. Carries the date window when the
    /// document provided one so the next refresh can still be timed from it.
    #[error("no image available today")]
    NoImageAvailable { full_start_date: Option<String> },
    #[error("invalid metadata document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

impl From<HttpError> for FetchError {
    fn from(e: HttpError) -> Self {
        FetchError::Network(e.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("copyright has no parenthetical group: {0:?}")]
    MalformedCopyright(String),
    #[error("malformed date: {0:?}")]
    MalformedDate(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(String),
    #[error("i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),
    #[error("download cancelled")]
    Cancelled,
}

impl From<HttpError> for DownloadError {
    fn from(e: HttpError) -> Self {
        DownloadError::Network(e.to_string())
    }
}
