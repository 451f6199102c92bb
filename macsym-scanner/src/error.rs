use std::error::Error;
use std::fmt;

use thiserror::Error;

/// Variants of [`ScanError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// The report contains no binary image rows, so no address can ever be
    /// resolved.
    MissingImages,

    /// The report contains no thread or stack blocks.
    NoStackBlocks,

    /// The report file could not be read.
    UnreadableFile,

    /// The report is in a dialect that needs a normalizer, but none was
    /// provided.
    UnsupportedDialect,

    /// A configured line pattern is not a valid regular expression.
    InvalidPattern,
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingImages => write!(f, "no binary images in report"),
            Self::NoStackBlocks => write!(f, "no stack blocks in report"),
            Self::UnreadableFile => write!(f, "failed to read report file"),
            Self::UnsupportedDialect => write!(f, "unsupported report dialect"),
            Self::InvalidPattern => write!(f, "invalid line pattern"),
        }
    }
}

/// An error returned while scanning a crash report.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ScanError {
    kind: ScanErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ScanError {
    /// Creates a new scan error with an underlying source.
    pub fn new<E>(kind: ScanErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`ScanErrorKind`] for this error.
    pub fn kind(&self) -> ScanErrorKind {
        self.kind
    }
}

impl From<ScanErrorKind> for ScanError {
    fn from(kind: ScanErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<regex::Error> for ScanError {
    fn from(source: regex::Error) -> Self {
        Self::new(ScanErrorKind::InvalidPattern, source)
    }
}
