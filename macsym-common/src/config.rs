//! The configuration value handed to the pipeline at construction time.
//!
//! Configuration is read once at start-up by the embedding application and
//! passed in as a plain value. Nothing in this workspace reads configuration
//! from process-global state. The [`Default`] impl carries the canonical
//! macOS crash-report patterns and conservative limits, so embedders only
//! override what differs in their deployment (URLs, credentials, paths).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppVersion, Arch};

/// Top-level pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Report dialect patterns and header identifiers.
    pub patterns: PatternConfig,
    /// Symbol cache locations and retention.
    pub store: StoreConfig,
    /// Archive download endpoints and transfer tuning.
    pub download: DownloadConfig,
    /// External resolver tool and concurrency limits.
    pub resolver: ResolverConfig,
}

/// Regular expressions describing the supported crash-report dialects.
///
/// All patterns use the `regex` crate syntax. The capture group layout of
/// each pattern is part of the contract with the scanner and documented on
/// the field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Full match for an acceptable caller-supplied version string.
    pub version_full: String,
    /// Search pattern extracting an embedded version from a binary image row.
    pub version_search: String,
    /// Thread block header. Groups: 1 thread index, 2 crashed marker,
    /// 3 backtrace-only marker, 4 name tail.
    pub thread_start: String,
    /// Unresolved stack frame. Groups: 1 frame index, 2 image name,
    /// 3 target address, 4 load address.
    pub stack_line: String,
    /// Already-symbolicated stack frame. Groups: 1 frame index, 2 image
    /// name, 3 target address, 4 symbol text, 5 offset.
    pub symbolized_line: String,
    /// Binary image table row. Groups: 1 load address, 2 end address,
    /// 3 binary name, 4 parenthesized detail, 5 uuid (optional), 6 path.
    pub binary_image: String,
    /// Diagnostic (spin/hang) frame. Groups: 1 indent, 2 frame index,
    /// 3 symbol text, 4 image name, 5 target address.
    pub diag_line: String,
    /// Header field prefixes attributed at most once per report.
    pub crash_identifiers: Vec<String>,
    /// The header prefix naming the crashed thread index.
    pub crashed_thread_identifier: String,
    /// Path fragment marking the crashing application's own bundle. A binary
    /// image row whose path contains this fragment carries the authoritative
    /// report version.
    pub binary_with_version: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            version_full: r"^\d+\.\d+\.\d+\.\d+$".into(),
            version_search: r"\d+\.\d+\.\d+\.\d+".into(),
            thread_start: r"^(?:Thread\s+(\d+)\s*(Crashed)?:|(Application Specific Backtrace\s*\d*):?)\s*(.*)$".into(),
            stack_line: r"^(\d+)\s+(\S[\S ]*?)\s+(0x[0-9a-fA-F]+)\s+(0x[0-9a-fA-F]+)\s*\+\s*\d+$".into(),
            symbolized_line: r"^(\d+)\s+(\S[\S ]*?)\s+(0x[0-9a-fA-F]+)\s+(\S.*?)\s+\+\s+(\d+)$".into(),
            binary_image: r"^\s*(0x[0-9a-fA-F]+)\s*-\s*(0x[0-9a-fA-F]+)\s+(\+?\S[\S ]*?)\s+\(([^)]*)\)\s+(?:<([0-9a-fA-F-]+)>\s+)?(/.+)$".into(),
            diag_line: r"^(\s*)(\d+)\s+(.*?)\s*\((\S[\S ]*?)\s*\+\s*\d+\)\s+\[(0x[0-9a-fA-F]+)\]$".into(),
            crash_identifiers: [
                "Incident Identifier:",
                "Hardware Model:",
                "Process:",
                "Path:",
                "Identifier:",
                "Version:",
                "Code Type:",
                "Parent Process:",
                "Date/Time:",
                "OS Version:",
                "Report Version:",
                "Exception Type:",
                "Exception Codes:",
                "Crashed Thread:",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            crashed_thread_identifier: "Crashed Thread:".into(),
            binary_with_version: ".app/Contents/MacOS".into(),
        }
    }
}

/// Locations and retention policy of the on-disk symbol cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding one subdirectory per cached version.
    pub symbol_dir: PathBuf,
    /// Path of the SQLite database mapping binaries to debug files.
    pub db_path: PathBuf,
    /// Number of version directories kept when evicting old versions.
    pub max_cached_versions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            symbol_dir: PathBuf::from("symbols"),
            db_path: PathBuf::from("symbols/macsym.db"),
            max_cached_versions: 10,
        }
    }
}

/// HTTP Basic credentials for a symbol archive endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Basic auth user name.
    pub username: String,
    /// Basic auth password.
    pub password: String,
}

/// One download tier: a base URL per architecture plus optional credentials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolSource {
    /// Base URL for x86_64 archives.
    pub url_x86_64: String,
    /// Base URL for arm64 archives.
    pub url_arm64: String,
    /// URL template; `{base_url}`, `{version}` and `{archive}` are
    /// substituted.
    pub file_format: String,
    /// Credentials sent with every request to this tier, if any.
    pub credentials: Option<Credentials>,
}

impl Default for SymbolSource {
    fn default() -> Self {
        SymbolSource {
            url_x86_64: String::new(),
            url_arm64: String::new(),
            file_format: "{base_url}/{version}/{archive}".into(),
            credentials: None,
        }
    }
}

impl SymbolSource {
    /// Whether this tier has a base URL for the given architecture.
    pub fn is_configured(&self, arch: Arch) -> bool {
        !self.base_url(arch).is_empty()
    }

    fn base_url(&self, arch: Arch) -> &str {
        match arch {
            Arch::X86_64 => &self.url_x86_64,
            Arch::Arm64 => &self.url_arm64,
        }
    }

    /// Renders the archive URL for a version and architecture.
    pub fn archive_url(&self, version: &AppVersion, arch: Arch, archive: &str) -> String {
        self.file_format
            .replace("{base_url}", self.base_url(arch))
            .replace("{version}", version.as_str())
            .replace("{archive}", archive)
    }
}

/// Archive download endpoints and transfer tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Primary download tier, tried first.
    pub primary: SymbolSource,
    /// Backup tier, tried after the primary is exhausted.
    pub backup: SymbolSource,
    /// File name of the symbol archive on the server and on disk.
    pub archive_name: String,
    /// Size of one range-request chunk in bytes.
    pub chunk_size: u64,
    /// Maximum number of chunk requests in flight.
    pub max_concurrent_chunks: usize,
    /// Total timeout applied to every HTTP request, in seconds.
    pub timeout_secs: u64,
    /// Attempts per chunk before the transfer fails.
    pub max_chunk_retries: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            primary: SymbolSource::default(),
            backup: SymbolSource::default(),
            archive_name: "symbols.zip".into(),
            chunk_size: 8 * 1024 * 1024,
            max_concurrent_chunks: 10,
            timeout_secs: 600,
            max_chunk_retries: 5,
        }
    }
}

impl DownloadConfig {
    /// The request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// External resolver tool and pipeline concurrency limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Name or path of the address-to-symbol tool, resolved via `PATH`.
    pub tool: String,
    /// Maximum resolver processes alive at once. Sized well below the
    /// default open-file limit; every invocation holds pipes open.
    pub max_concurrent_resolutions: usize,
    /// Seconds after which a resolver invocation is abandoned.
    pub timeout_secs: u64,
    /// Thread blocks handed to the engine per run; the crashed block is
    /// always within this window since it sorts first.
    pub max_thread_blocks: usize,
    /// Upper bound on candidate matches per debug-bundle search.
    pub search_candidate_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            tool: "atos".into(),
            max_concurrent_resolutions: 20,
            timeout_secs: 30,
            max_thread_blocks: 10,
            search_candidate_limit: 5,
        }
    }
}

impl ResolverConfig {
    /// The subprocess timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_url_substitution() {
        let source = SymbolSource {
            url_x86_64: "https://symbols.example.com/osx".into(),
            url_arm64: "https://symbols.example.com/arm".into(),
            ..SymbolSource::default()
        };
        let version = AppVersion::parse("44.10.0.30800").unwrap();

        assert_eq!(
            source.archive_url(&version, Arch::Arm64, "symbols.zip"),
            "https://symbols.example.com/arm/44.10.0.30800/symbols.zip"
        );
        assert!(source.is_configured(Arch::X86_64));
    }

    #[test]
    fn test_default_config_roundtrips_through_serde() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_unconfigured_tier() {
        let source = SymbolSource::default();
        assert!(!source.is_configured(Arch::Arm64));
    }
}
