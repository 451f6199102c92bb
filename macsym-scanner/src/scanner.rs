//! The report scanner: classification, ordered reduction, image table.

use std::mem;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use macsym_common::{AppVersion, Arch, PatternConfig};

use crate::classify::{LineClassifier, LinePatterns};
use crate::error::{ScanError, ScanErrorKind};
use crate::line::{BinaryImage, CrashLine, CrashLineKind, ImageTable, ThreadHeader};

lazy_static! {
    static ref FIRST_INTEGER: Regex = Regex::new(r"\d+").unwrap();
}

/// The lines of one thread (or one diagnostic group), in report order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadBlock {
    /// The block's lines; the first line is the thread header if the block
    /// has one.
    pub lines: Vec<CrashLine>,
}

impl ThreadBlock {
    /// The thread header opening this block, if any.
    pub fn header(&self) -> Option<&ThreadHeader> {
        match self.lines.first()?.kind {
            CrashLineKind::Thread(ref header) => Some(header),
            _ => None,
        }
    }

    fn header_mut(&mut self) -> Option<&mut ThreadHeader> {
        match self.lines.first_mut()?.kind {
            CrashLineKind::Thread(ref mut header) => Some(header),
            _ => None,
        }
    }

    /// Whether this block belongs to the crashed thread.
    pub fn is_crashed(&self) -> bool {
        self.header().is_some_and(|header| header.crashed)
    }

    /// Number of frame lines (stack, symbolized or diagnostic) in the block.
    pub fn frame_count(&self) -> usize {
        self.lines.iter().filter(|line| line.is_frame()).count()
    }
}

/// Everything extracted from one crash report.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanReport {
    /// Header fields in report order, as `(identifier, value)` pairs.
    pub info: Vec<(String, String)>,
    /// Thread blocks with the crashed thread first.
    pub blocks: Vec<ThreadBlock>,
    /// Version embedded in the crashing application's image row, if any.
    /// Overrides the caller-supplied version.
    pub version: Option<AppVersion>,
    /// Architecture revealed by the report, if any. Overrides the
    /// caller-supplied architecture.
    pub arch: Option<Arch>,
    /// The binary image table.
    pub images: ImageTable,
}

impl ScanReport {
    /// Total number of frame lines across all blocks.
    pub fn frame_count(&self) -> usize {
        self.blocks.iter().map(ThreadBlock::frame_count).sum()
    }
}

/// Scans crash reports according to a set of dialect patterns.
#[derive(Debug)]
pub struct CrashScanner {
    patterns: LinePatterns,
    identifiers: Vec<String>,
    crashed_thread_identifier: String,
    bundle_marker: String,
}

impl CrashScanner {
    /// Creates a scanner from the dialect configuration.
    pub fn new(config: &PatternConfig) -> Result<Self, ScanError> {
        Ok(CrashScanner {
            patterns: LinePatterns::compile(config)?,
            identifiers: config.crash_identifiers.clone(),
            crashed_thread_identifier: config.crashed_thread_identifier.clone(),
            bundle_marker: config.binary_with_version.clone(),
        })
    }

    /// The compiled patterns, shared with the pipeline for version
    /// validation.
    pub fn patterns(&self) -> &LinePatterns {
        &self.patterns
    }

    /// Scans a complete report.
    ///
    /// Classification itself is pure and order-independent; the reduction
    /// into blocks is not, so classified lines are re-sorted by their
    /// original index before reducing. A report without a single binary
    /// image row cannot be resolved and fails with
    /// [`ScanErrorKind::MissingImages`].
    pub fn scan(&self, content: &str) -> Result<ScanReport, ScanError> {
        let mut classifier = LineClassifier::new(&self.patterns, &self.identifiers);
        let mut lines: Vec<CrashLine> = content
            .lines()
            .enumerate()
            .map(|(index, raw)| classifier.classify(index, raw))
            .collect();

        lines.sort_by_key(|line| line.index);

        let (images, version, image_arch) = self.collect_images(&lines)?;
        let (info, mut blocks) = Self::reduce_blocks(&lines);

        let arch = info
            .iter()
            .find_map(|(_, value)| Arch::detect(value))
            .or(image_arch);

        Self::mark_crashed_from_info(&info, &self.crashed_thread_identifier, &mut blocks);
        Self::promote_crashed_block(&mut blocks);

        tracing::debug!(
            blocks = blocks.len(),
            images = images.len(),
            version = version.as_ref().map(|v| v.as_str()),
            "report scanned"
        );

        Ok(ScanReport {
            info,
            blocks,
            version,
            arch,
            images,
        })
    }

    fn collect_images(
        &self,
        lines: &[CrashLine],
    ) -> Result<(ImageTable, Option<AppVersion>, Option<Arch>), ScanError> {
        let mut images = ImageTable::new();
        let mut version = None;
        let mut arch = None;

        for line in lines {
            let row = match line.kind {
                CrashLineKind::Binary(ref row) => row,
                _ => continue,
            };

            let name = Path::new(&row.path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            let image = BinaryImage {
                uuid: row.uuid,
                name,
                name_from_binary: row.name.trim_start_matches('+').to_owned(),
                load_address: row.load_address.clone(),
                arch: Arch::detect(&row.detail),
                debug_path: None,
            };

            if arch.is_none() {
                arch = image.arch;
            }

            images.insert(image);

            // The crashing application's own image row carries the build
            // version in its path; that value overrides the caller's.
            if row.path.contains(&self.bundle_marker) {
                if let Some(found) = self.patterns.search_version(&line.text) {
                    version = Some(found);
                }
            }
        }

        if images.is_empty() {
            return Err(ScanErrorKind::MissingImages.into());
        }

        Ok((images, version, arch))
    }

    fn reduce_blocks(lines: &[CrashLine]) -> (Vec<(String, String)>, Vec<ThreadBlock>) {
        let mut info = Vec::new();
        let mut blocks = Vec::new();
        let mut current: Vec<CrashLine> = Vec::new();

        for line in lines {
            match line.kind {
                CrashLineKind::Blank | CrashLineKind::Thread(_) => {
                    if !current.is_empty() {
                        blocks.push(ThreadBlock {
                            lines: mem::take(&mut current),
                        });
                    }
                    if matches!(line.kind, CrashLineKind::Thread(_)) {
                        current.push(line.clone());
                    }
                }
                CrashLineKind::Stack(_)
                | CrashLineKind::Symbolized(_)
                | CrashLineKind::Diagnostic(_) => current.push(line.clone()),
                CrashLineKind::Info { ref key, ref value } => {
                    info.push((key.clone(), value.clone()));
                    current.push(line.clone());
                }
                CrashLineKind::Binary(_) | CrashLineKind::Other => {}
            }
        }

        if !current.is_empty() {
            blocks.push(ThreadBlock { lines: current });
        }

        (info, blocks)
    }

    /// Honors the `Crashed Thread: N` header: the block with thread index N
    /// is crashed even without an inline `Crashed` marker.
    fn mark_crashed_from_info(
        info: &[(String, String)],
        crashed_thread_identifier: &str,
        blocks: &mut [ThreadBlock],
    ) {
        let crashed_index: Option<u32> = info
            .iter()
            .find(|(key, _)| key == crashed_thread_identifier)
            .and_then(|(_, value)| FIRST_INTEGER.find(value))
            .and_then(|m| m.as_str().parse().ok());

        let crashed_index = match crashed_index {
            Some(index) => index,
            None => return,
        };

        for block in blocks {
            if let Some(header) = block.header_mut() {
                if header.thread_index == crashed_index {
                    header.crashed = true;
                    break;
                }
            }
        }
    }

    /// Moves the first crashed block to position 0, keeping the relative
    /// order of all other blocks. Idempotent.
    fn promote_crashed_block(blocks: &mut Vec<ThreadBlock>) {
        if let Some(position) = blocks.iter().position(ThreadBlock::is_crashed) {
            if position > 0 {
                let crashed = blocks.remove(position);
                blocks.insert(0, crashed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    const REPORT: &str = "\
Process:               Webex Teams [4242]
Identifier:            com.cisco.webex.teams
Version:               44.10.0.30800
Code Type:             X86-64 (Native)
OS Version:            macOS 13.2 (22D49)
Crashed Thread:        1

Thread 0:
0   libsystem_kernel.dylib    0x00007fff6c7e4b66 0x7fff6c7cf000 + 89958
1   CoreFoundation            0x00007fff2e8c1111 __CFRunLoopRun + 1234

Thread 1:
0   Webex Teams               0x000000010920b2f0 0x108f9d000 + 2548464
1   Webex Teams               0x000000010920b2f0 0x108f9d000 + 2548464

Binary Images:
0x108f9d000 - 0x10ad35ff7 +Webex Teams (44.10.0.30800) <5bf5c5ba-c53d-3e48-a8b3-deadbeef0001> /Applications/Webex Teams.app/Contents/MacOS/Webex Teams
0x7fff6c7cf000 - 0x7fff6c7fcfff libsystem_kernel.dylib (6153.141.1) <999a5d8a-e56e-3f24-9be1-deadbeef0002> /usr/lib/system/libsystem_kernel.dylib
";

    fn scanner() -> CrashScanner {
        CrashScanner::new(&PatternConfig::default()).unwrap()
    }

    #[test]
    fn test_scan_partitions_all_frames() {
        let report = scanner().scan(REPORT).unwrap();

        assert_eq!(report.images.len(), 2);
        // Header info lines form a block of their own, plus two threads.
        assert_eq!(report.blocks.len(), 3);
        assert_eq!(report.frame_count(), 4);
    }

    #[test]
    fn test_crashed_thread_header_promotes_block() {
        let report = scanner().scan(REPORT).unwrap();

        // `Crashed Thread: 1` marks thread 1 even without an inline marker,
        // and the block moves to the front.
        let first = report.blocks[0].header().unwrap();
        assert_eq!(first.thread_index, 1);
        assert!(first.crashed);

        // Relative order of the remaining blocks is untouched.
        assert!(report.blocks[1].header().is_none());
        assert_eq!(report.blocks[2].header().unwrap().thread_index, 0);
    }

    #[test]
    fn test_promotion_is_idempotent() {
        let report = scanner().scan(REPORT).unwrap();

        let mut once = report.blocks.clone();
        CrashScanner::promote_crashed_block(&mut once);
        assert_eq!(once, report.blocks);
    }

    #[test]
    fn test_embedded_version_and_arch() {
        let report = scanner().scan(REPORT).unwrap();

        assert_eq!(report.version.unwrap().as_str(), "44.10.0.30800");
        assert_eq!(report.arch, Some(Arch::X86_64));
    }

    #[test]
    fn test_info_captured_in_order() {
        let report = scanner().scan(REPORT).unwrap();

        assert_eq!(report.info[0].0, "Process:");
        assert_eq!(report.info[0].1, "Webex Teams [4242]");
        assert!(report
            .info
            .iter()
            .any(|(key, value)| key == "Crashed Thread:" && value == "1"));
    }

    #[test]
    fn test_missing_images_is_fatal() {
        let error = scanner()
            .scan("Thread 0 Crashed:\n0   Foo   0x1 0x0 + 1\n")
            .expect_err("no binary images");
        assert_eq!(error.kind(), ScanErrorKind::MissingImages);
    }

    #[test]
    fn test_line_indices_preserved() {
        let report = scanner().scan(REPORT).unwrap();

        for block in &report.blocks {
            for window in block.lines.windows(2) {
                assert!(window[0].index < window[1].index);
            }
        }
    }

    #[test]
    fn test_identity_keys() {
        let report = scanner().scan(REPORT).unwrap();

        let image = report.images.by_name("Webex Teams").unwrap();
        assert_eq!(
            image.identity_key(),
            image.uuid.unwrap().to_string()
        );
        assert_eq!(report.images.by_load_address("0x7fff6c7cf000").unwrap().name, "libsystem_kernel.dylib");
    }
}
