use std::error::Error;
use std::fmt;

use thiserror::Error;

/// Variants of [`RetrievalError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalErrorKind {
    /// The server rejected the credentials (HTTP 401).
    Unauthorized,

    /// The archive does not exist on the server (HTTP 404).
    NotFound,

    /// Any other HTTP failure.
    Http,

    /// A network operation exceeded its total timeout.
    Timeout,

    /// The downloaded archive failed integrity validation.
    Validation,

    /// The archive could not be extracted; the file is preserved on disk
    /// for manual recovery.
    Extraction,

    /// The external extraction tool is not installed.
    ToolMissing,

    /// Every configured download source failed.
    SourcesExhausted,

    /// A local file operation failed.
    Io,
}

impl fmt::Display for RetrievalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized (check credentials)"),
            Self::NotFound => write!(f, "archive not found"),
            Self::Http => write!(f, "http request failed"),
            Self::Timeout => write!(f, "download timed out"),
            Self::Validation => write!(f, "archive validation failed"),
            Self::Extraction => write!(f, "archive extraction failed"),
            Self::ToolMissing => write!(f, "extraction tool not installed"),
            Self::SourcesExhausted => write!(f, "all download sources failed"),
            Self::Io => write!(f, "file operation failed"),
        }
    }
}

/// An error returned while fetching or unpacking a symbol archive.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct RetrievalError {
    kind: RetrievalErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl RetrievalError {
    /// Creates a new retrieval error with an underlying source.
    pub fn new<E>(kind: RetrievalErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`RetrievalErrorKind`] for this error.
    pub fn kind(&self) -> RetrievalErrorKind {
        self.kind
    }
}

impl From<RetrievalErrorKind> for RetrievalError {
    fn from(kind: RetrievalErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<reqwest::Error> for RetrievalError {
    fn from(source: reqwest::Error) -> Self {
        let kind = if source.is_timeout() {
            RetrievalErrorKind::Timeout
        } else {
            RetrievalErrorKind::Http
        };
        Self::new(kind, source)
    }
}

impl From<std::io::Error> for RetrievalError {
    fn from(source: std::io::Error) -> Self {
        Self::new(RetrievalErrorKind::Io, source)
    }
}
