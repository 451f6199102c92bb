//! Pattern compilation and single-line classification.

use debugid::DebugId;
use regex::Regex;

use macsym_common::{AppVersion, PatternConfig};

use crate::error::ScanError;
use crate::line::{
    BinaryRow, CrashLine, CrashLineKind, DiagnosticFrame, StackFrame, SymbolizedFrame,
    ThreadHeader,
};

/// The dialect patterns of [`PatternConfig`], compiled once per scanner.
#[derive(Debug)]
pub struct LinePatterns {
    version_full: Regex,
    version_search: Regex,
    thread_start: Regex,
    stack_line: Regex,
    symbolized_line: Regex,
    binary_image: Regex,
    diag_line: Regex,
}

impl LinePatterns {
    /// Compiles all patterns from the configuration.
    pub fn compile(config: &PatternConfig) -> Result<Self, ScanError> {
        Ok(LinePatterns {
            version_full: Regex::new(&config.version_full)?,
            version_search: Regex::new(&config.version_search)?,
            thread_start: Regex::new(&config.thread_start)?,
            stack_line: Regex::new(&config.stack_line)?,
            symbolized_line: Regex::new(&config.symbolized_line)?,
            binary_image: Regex::new(&config.binary_image)?,
            diag_line: Regex::new(&config.diag_line)?,
        })
    }

    /// Whether a caller-supplied version string is acceptable.
    pub fn version_is_valid(&self, version: &str) -> bool {
        self.version_full.is_match(version.trim())
    }

    /// Extracts an embedded version from free-form text.
    pub fn search_version(&self, text: &str) -> Option<AppVersion> {
        let found = self.version_search.find(text)?;
        AppVersion::parse(found.as_str()).ok()
    }
}

/// Classifies raw report lines one at a time.
///
/// The classifier owns the set of not-yet-matched header identifiers; each
/// identifier is consumed on first match, so a header field repeated inside
/// a stack trace is attributed only once. Use one classifier per report.
#[derive(Debug)]
pub struct LineClassifier<'p> {
    patterns: &'p LinePatterns,
    remaining_identifiers: Vec<String>,
}

impl<'p> LineClassifier<'p> {
    /// Creates a classifier over the given patterns and header identifiers.
    pub fn new(patterns: &'p LinePatterns, identifiers: &[String]) -> Self {
        LineClassifier {
            patterns,
            remaining_identifiers: identifiers.to_vec(),
        }
    }

    /// Classifies one raw line.
    ///
    /// Never fails: content that matches no dialect pattern becomes
    /// [`CrashLineKind::Other`] and is dropped from further processing.
    pub fn classify(&mut self, index: usize, raw: &str) -> CrashLine {
        let text = raw.trim_end().to_owned();
        let kind = self.classify_kind(&text);

        CrashLine { index, text, kind }
    }

    fn classify_kind(&mut self, text: &str) -> CrashLineKind {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return CrashLineKind::Blank;
        }

        if let Some(caps) = self.patterns.thread_start.captures(trimmed) {
            let thread_index = caps
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let backtrace_only = caps.get(3).is_some();
            let crashed = backtrace_only
                || caps
                    .get(2)
                    .is_some_and(|m| m.as_str().to_lowercase().contains("crashed"));

            return CrashLineKind::Thread(ThreadHeader {
                thread_index,
                crashed,
                name: caps.get(4).map_or("", |m| m.as_str()).to_owned(),
            });
        }

        if let Some(position) = self
            .remaining_identifiers
            .iter()
            .position(|identifier| trimmed.starts_with(identifier.as_str()))
        {
            let key = self.remaining_identifiers.remove(position);
            let value = trimmed[key.len()..].trim().to_owned();
            return CrashLineKind::Info { key, value };
        }

        if let Some(caps) = self.patterns.stack_line.captures(trimmed) {
            return CrashLineKind::Stack(StackFrame {
                frame_index: caps[1].parse().unwrap_or(0),
                image_name: caps[2].to_owned(),
                target_address: caps[3].to_owned(),
                load_address: caps[4].to_owned(),
            });
        }

        if let Some(caps) = self.patterns.symbolized_line.captures(trimmed) {
            return CrashLineKind::Symbolized(SymbolizedFrame {
                frame_index: caps[1].parse().unwrap_or(0),
                image_name: caps[2].to_owned(),
                target_address: caps[3].to_owned(),
                symbol: format!("{} + {}", &caps[4], &caps[5]),
            });
        }

        if let Some(caps) = self.patterns.binary_image.captures(trimmed) {
            let uuid = caps
                .get(5)
                .and_then(|m| m.as_str().parse::<DebugId>().ok());
            return CrashLineKind::Binary(BinaryRow {
                load_address: caps[1].to_owned(),
                end_address: caps[2].to_owned(),
                name: caps[3].to_owned(),
                detail: caps[4].to_owned(),
                uuid,
                path: caps[6].to_owned(),
            });
        }

        // Matched against the unstripped line so the indent survives into
        // the rendered output.
        if let Some(caps) = self.patterns.diag_line.captures(text) {
            return CrashLineKind::Diagnostic(DiagnosticFrame {
                indent: caps[1].to_owned(),
                frame_index: caps[2].parse().unwrap_or(0),
                symbol: caps[3].trim().to_owned(),
                image_name: caps[4].to_owned(),
                target_address: caps[5].to_owned(),
            });
        }

        CrashLineKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> LinePatterns {
        LinePatterns::compile(&PatternConfig::default()).unwrap()
    }

    fn classify(line: &str) -> CrashLineKind {
        let patterns = patterns();
        let identifiers = PatternConfig::default().crash_identifiers;
        LineClassifier::new(&patterns, &identifiers)
            .classify(0, line)
            .kind
    }

    #[test]
    fn test_blank() {
        assert_eq!(classify("   "), CrashLineKind::Blank);
        assert_eq!(classify(""), CrashLineKind::Blank);
    }

    #[test]
    fn test_thread_header() {
        match classify("Thread 5 Crashed:: Dispatch queue: com.apple.main-thread") {
            CrashLineKind::Thread(header) => {
                assert_eq!(header.thread_index, 5);
                assert!(header.crashed);
            }
            other => panic!("classified as {other:?}"),
        }

        match classify("Thread 2:") {
            CrashLineKind::Thread(header) => {
                assert_eq!(header.thread_index, 2);
                assert!(!header.crashed);
            }
            other => panic!("classified as {other:?}"),
        }

        match classify("Application Specific Backtrace 1:") {
            CrashLineKind::Thread(header) => assert!(header.crashed),
            other => panic!("classified as {other:?}"),
        }
    }

    #[test]
    fn test_info_consumed_once() {
        let patterns = patterns();
        let identifiers = PatternConfig::default().crash_identifiers;
        let mut classifier = LineClassifier::new(&patterns, &identifiers);

        match classifier.classify(0, "OS Version: macOS 13.2 (22D49)").kind {
            CrashLineKind::Info { key, value } => {
                assert_eq!(key, "OS Version:");
                assert_eq!(value, "macOS 13.2 (22D49)");
            }
            other => panic!("classified as {other:?}"),
        }

        // The identifier was consumed, so a second occurrence is not an
        // info line anymore.
        assert_eq!(
            classifier.classify(1, "OS Version: macOS 13.2 (22D49)").kind,
            CrashLineKind::Other
        );
    }

    #[test]
    fn test_stack_frame() {
        match classify("6   SkyLight    0x00007fff524bbfe6 0x7fff5245f000 + 380902") {
            CrashLineKind::Stack(frame) => {
                assert_eq!(frame.frame_index, 6);
                assert_eq!(frame.image_name, "SkyLight");
                assert_eq!(frame.target_address, "0x00007fff524bbfe6");
                assert_eq!(frame.load_address, "0x7fff5245f000");
            }
            other => panic!("classified as {other:?}"),
        }
    }

    #[test]
    fn test_stack_frame_image_name_with_spaces() {
        match classify("0   Webex Teams   0x000000010920b2f0 0x108f9d000 + 2548464") {
            CrashLineKind::Stack(frame) => {
                assert_eq!(frame.image_name, "Webex Teams");
            }
            other => panic!("classified as {other:?}"),
        }
    }

    #[test]
    fn test_symbolized_frame() {
        match classify("4   CoreFoundation    0x00007fff2e8c1111 __CFRunLoopRun + 1234") {
            CrashLineKind::Symbolized(frame) => {
                assert_eq!(frame.frame_index, 4);
                assert_eq!(frame.symbol, "__CFRunLoopRun + 1234");
            }
            other => panic!("classified as {other:?}"),
        }
    }

    #[test]
    fn test_binary_row() {
        let line = "0x108f9d000 - 0x10ad35ff7 +Webex Teams (44.10.0.30800) \
                    <5bf5c5ba-c53d-3e48-a8b3-deadbeef0001> /Applications/Webex Teams.app/Contents/MacOS/Webex Teams";
        match classify(line) {
            CrashLineKind::Binary(row) => {
                assert_eq!(row.load_address, "0x108f9d000");
                assert_eq!(row.name, "+Webex Teams");
                assert_eq!(row.detail, "44.10.0.30800");
                assert!(row.uuid.is_some());
                assert!(row.path.ends_with("MacOS/Webex Teams"));
            }
            other => panic!("classified as {other:?}"),
        }
    }

    #[test]
    fn test_binary_row_without_uuid() {
        let line = "0x7fff204ae000 - 0x7fff20552fff com.apple.AppKit (6.9) /System/Library/Frameworks/AppKit.framework/AppKit";
        match classify(line) {
            CrashLineKind::Binary(row) => assert_eq!(row.uuid, None),
            other => panic!("classified as {other:?}"),
        }
    }

    #[test]
    fn test_diag_frame_keeps_indent() {
        match classify("  21  ??? (Webex Teams + 2548464) [0x10920b2f0]") {
            CrashLineKind::Diagnostic(frame) => {
                assert_eq!(frame.indent, "  ");
                assert_eq!(frame.frame_index, 21);
                assert!(!frame.is_symbolized());
                assert_eq!(frame.image_name, "Webex Teams");
                assert_eq!(frame.target_address, "0x10920b2f0");
            }
            other => panic!("classified as {other:?}"),
        }

        match classify("  3  thread_start + 15 (libsystem_pthread.dylib + 7426) [0x7fff6c89ae42]") {
            CrashLineKind::Diagnostic(frame) => {
                assert!(frame.is_symbolized());
                assert_eq!(frame.symbol, "thread_start + 15");
            }
            other => panic!("classified as {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_is_other() {
        assert_eq!(
            classify("anything else entirely"),
            CrashLineKind::Other
        );
    }
}
