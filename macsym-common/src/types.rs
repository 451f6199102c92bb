//! Architecture and version types used across the pipeline.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref X86_HINT: Regex = Regex::new(r"(?i)\bx86[-_]?64\b").unwrap();
    static ref ARM_HINT: Regex = Regex::new(r"(?i)\barm[-_]?64e?\b").unwrap();
}

/// An error returned for an invalid [`Arch`].
#[derive(Debug)]
pub struct UnknownArchError;

impl fmt::Display for UnknownArchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown architecture")
    }
}

impl std::error::Error for UnknownArchError {}

/// The CPU architecture a crash report was captured on.
///
/// The architecture selects the download URL for symbol archives and is passed
/// verbatim to the external resolver tool. Only the two architectures shipped
/// for macOS desktop applications are supported.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// 64-bit Intel, reported as `X86-64` in crash headers.
    X86_64,
    /// 64-bit ARM (Apple silicon), reported as `ARM-64` in crash headers.
    Arm64,
}

impl Arch {
    /// The canonical name, as used in directory layouts and resolver args.
    pub fn name(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Detects an architecture mentioned anywhere in free-form text.
    ///
    /// Crash reports reveal the architecture in several places (the
    /// `Code Type:` header, binary image rows). Returns `None` if the text
    /// mentions neither architecture.
    pub fn detect(text: &str) -> Option<Self> {
        if X86_HINT.is_match(text) {
            Some(Arch::X86_64)
        } else if ARM_HINT.is_match(text) {
            Some(Arch::Arm64)
        } else {
            None
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = UnknownArchError;

    fn from_str(string: &str) -> Result<Arch, UnknownArchError> {
        Arch::detect(string).ok_or(UnknownArchError)
    }
}

/// An error returned for an unparsable [`AppVersion`].
#[derive(Debug)]
pub struct ParseVersionError;

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid dotted version")
    }
}

impl std::error::Error for ParseVersionError {}

/// A dotted application version such as `44.10.0.30800`.
///
/// Versions order numerically per dot segment, not lexicographically:
/// `44.9.0.1` sorts before `44.10.0.1`. This ordering drives cache eviction,
/// which always removes the numerically oldest versions first.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppVersion {
    segments: Vec<u64>,
    raw: String,
}

impl AppVersion {
    /// Parses a dotted version string.
    ///
    /// Every dot segment must be a decimal integer; anything else (including
    /// an empty string) is rejected.
    pub fn parse(raw: &str) -> Result<Self, ParseVersionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ParseVersionError);
        }

        let segments = raw
            .split('.')
            .map(|s| s.parse().map_err(|_| ParseVersionError))
            .collect::<Result<Vec<u64>, _>>()?;

        Ok(AppVersion {
            segments,
            raw: raw.to_owned(),
        })
    }

    /// The version string exactly as parsed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The numeric dot segments, most significant first.
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for AppVersion {
    type Err = ParseVersionError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        AppVersion::parse(string)
    }
}

impl TryFrom<String> for AppVersion {
    type Error = ParseVersionError;

    fn try_from(string: String) -> Result<Self, Self::Error> {
        AppVersion::parse(&string)
    }
}

impl From<AppVersion> for String {
    fn from(version: AppVersion) -> Self {
        version.raw
    }
}

impl Ord for AppVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Missing segments compare as zero, so `1.2` sorts with `1.2.0`.
        // The raw string breaks such ties, keeping the order total and
        // consistent with equality.
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let lhs = self.segments.get(i).copied().unwrap_or(0);
            let rhs = other.segments.get(i).copied().unwrap_or(0);
            match lhs.cmp(&rhs) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for AppVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
