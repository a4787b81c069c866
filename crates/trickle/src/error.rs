use std::fmt;

use reqwest::StatusCode;

/// Classification of a loader failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderErrorKind {
    /// Generic transport failure (network drop, malformed response)
    Exception,
    /// Response status was not acceptable for the issued request
    HttpStatusInvalid,
    /// No response headers arrived within the connect timeout
    ConnectingTimeout,
    /// Stream ended before the advertised length was reached
    EarlyEof,
    /// Early EOF with nothing to recover against, or repeated at the same offset
    UnrecoverableEarlyEof,
}

impl fmt::Display for LoaderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoaderErrorKind::Exception => "transport exception",
            LoaderErrorKind::HttpStatusInvalid => "invalid HTTP status",
            LoaderErrorKind::ConnectingTimeout => "connecting timeout",
            LoaderErrorKind::EarlyEof => "early EOF",
            LoaderErrorKind::UnrecoverableEarlyEof => "unrecoverable early EOF",
        };
        f.write_str(name)
    }
}

/// Error reported by a loader through its event channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LoaderError {
    pub kind: LoaderErrorKind,
    /// HTTP status code, when the failure came from a response
    pub code: Option<u16>,
    pub message: String,
}

impl LoaderError {
    pub fn new(kind: LoaderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(LoaderErrorKind::Exception, message)
    }

    pub fn http_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: LoaderErrorKind::HttpStatusInvalid,
            code: Some(status.as_u16()),
            message: message.into(),
        }
    }

    /// Whether a caller-driven seek to the failure offset may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind,
            LoaderErrorKind::EarlyEof | LoaderErrorKind::ConnectingTimeout
        )
    }
}

impl From<reqwest::Error> for LoaderError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() && !err.is_body() {
            LoaderErrorKind::ConnectingTimeout
        } else {
            LoaderErrorKind::Exception
        };
        Self {
            kind,
            code: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Errors returned synchronously by the [`IoController`](crate::IoController).
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Seek target {offset} is already buffered in segment {from}-{to}")]
    AlreadyBuffered { offset: u64, from: u64, to: u64 },

    #[error("Controller has not been opened")]
    NotOpened,

    #[error("Controller has been destroyed")]
    Destroyed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("No supported transport: {0}")]
    UnsupportedTransport(String),
}
