//! Report dialect selection and the normalizer seam.
//!
//! JSON incident reports (`.ips`) are converted to canonical crash text by
//! an external collaborator before scanning. The scanner only decides *when*
//! to invoke that collaborator: by file extension when reading from a path,
//! by content sniffing when handed a string.

use std::fs;
use std::path::Path;

use crate::error::{ScanError, ScanErrorKind};
use crate::scanner::{CrashScanner, ScanReport};

/// The input dialect of a crash report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportDialect {
    /// Canonical macOS crash-report text.
    CrashText,
    /// Spin/hang diagnostic text.
    Diagnostic,
    /// JSON incident report, optionally preceded by one metadata line.
    Json,
}

impl ReportDialect {
    /// Chooses a dialect from a file extension, if it is a known one.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "ips" => Some(ReportDialect::Json),
            "crash" => Some(ReportDialect::CrashText),
            "diag" | "spin" => Some(ReportDialect::Diagnostic),
            _ => None,
        }
    }

    /// Sniffs the dialect of in-memory content.
    ///
    /// JSON incident reports start with a `{`, possibly after a metadata
    /// line; everything else scans as text.
    pub fn sniff(content: &str) -> Self {
        match content.trim_start().starts_with('{') {
            true => ReportDialect::Json,
            false => ReportDialect::CrashText,
        }
    }
}

/// Converts a JSON incident report into canonical crash text.
///
/// Implemented outside this workspace; tests use a canned implementation.
/// The conversion is a pure function of the raw input.
pub trait ReportNormalizer: Send + Sync {
    /// Produces canonical crash text from raw dialect-specific input.
    fn normalize(&self, raw: &str) -> Result<String, ScanError>;
}

impl CrashScanner {
    /// Scans content of a known dialect, normalizing it first if needed.
    pub fn scan_content(
        &self,
        content: &str,
        dialect: ReportDialect,
        normalizer: Option<&dyn ReportNormalizer>,
    ) -> Result<ScanReport, ScanError> {
        match dialect {
            ReportDialect::CrashText | ReportDialect::Diagnostic => self.scan(content),
            ReportDialect::Json => match normalizer {
                Some(normalizer) => self.scan(&normalizer.normalize(content)?),
                None => Err(ScanErrorKind::UnsupportedDialect.into()),
            },
        }
    }

    /// Reads and scans a report file, choosing the dialect by extension.
    pub fn scan_file(
        &self,
        path: &Path,
        normalizer: Option<&dyn ReportNormalizer>,
    ) -> Result<ScanReport, ScanError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ScanError::new(ScanErrorKind::UnreadableFile, e))?;
        let dialect =
            ReportDialect::from_path(path).unwrap_or_else(|| ReportDialect::sniff(&content));

        self.scan_content(&content, dialect, normalizer)
    }
}
