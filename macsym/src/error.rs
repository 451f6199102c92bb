use std::error::Error;
use std::fmt;

use thiserror::Error;

use macsym_retrieval::RetrievalError;
use macsym_scanner::ScanError;

/// Variants of [`SymbolizeError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolizeErrorKind {
    /// The caller-supplied version does not match the accepted format.
    InvalidVersion,

    /// The caller-supplied architecture is empty or unknown.
    InvalidArch,

    /// No report content was provided.
    EmptyContent,

    /// Scanning failed; includes reports without binary images or without
    /// stack blocks.
    Scan,

    /// The symbol archive could not be fetched, validated or extracted.
    Retrieval,
}

impl fmt::Display for SymbolizeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion => write!(f, "invalid or unsupported version format"),
            Self::InvalidArch => write!(f, "invalid architecture"),
            Self::EmptyContent => write!(f, "empty crash content"),
            Self::Scan => write!(f, "failed to scan crash report"),
            Self::Retrieval => write!(f, "failed to retrieve symbol archive"),
        }
    }
}

/// An error aborting a symbolication run.
///
/// Per-line resolution failures never surface here; they are recorded on
/// the affected lines and the run completes partially symbolicated.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct SymbolizeError {
    kind: SymbolizeErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl SymbolizeError {
    /// Creates a new symbolize error with an underlying source.
    pub fn new<E>(kind: SymbolizeErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`SymbolizeErrorKind`] for this error.
    pub fn kind(&self) -> SymbolizeErrorKind {
        self.kind
    }
}

impl From<SymbolizeErrorKind> for SymbolizeError {
    fn from(kind: SymbolizeErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<ScanError> for SymbolizeError {
    fn from(source: ScanError) -> Self {
        Self::new(SymbolizeErrorKind::Scan, source)
    }
}

impl From<RetrievalError> for SymbolizeError {
    fn from(source: RetrievalError) -> Self {
        Self::new(SymbolizeErrorKind::Retrieval, source)
    }
}
