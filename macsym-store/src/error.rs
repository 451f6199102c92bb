use std::error::Error;
use std::fmt;

use thiserror::Error;

/// Variants of [`StoreError`].
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// The underlying SQLite database failed.
    Database,

    /// A filesystem operation on the symbol directory failed.
    Io,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => write!(f, "symbol database failed"),
            Self::Io => write!(f, "symbol directory operation failed"),
        }
    }
}

/// An error returned by the symbol version store.
///
/// Store failures never abort a pipeline run; callers degrade to treating
/// every lookup as a miss.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct StoreError {
    kind: StoreErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl StoreError {
    /// Creates a new store error with an underlying source.
    pub fn new<E>(kind: StoreErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`StoreErrorKind`] for this error.
    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }
}

impl From<StoreErrorKind> for StoreError {
    fn from(kind: StoreErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(source: rusqlite::Error) -> Self {
        Self::new(StoreErrorKind::Database, source)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        Self::new(StoreErrorKind::Io, source)
    }
}
