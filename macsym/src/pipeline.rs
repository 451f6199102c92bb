//! The pipeline driver.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use macsym_common::{AppVersion, Arch, Config};
use macsym_engine::{build_requests, AtosResolver, Resolve, SymbolizationEngine};
use macsym_retrieval::fetch_symbols;
use macsym_scanner::{
    CrashLineKind, CrashScanner, ReportDialect, ReportNormalizer, ScanError, ScanErrorKind,
    ScanReport,
};
use macsym_store::{has_debug_bundles, locate_debug_file, SymbolCacheEntry, SymbolStore};

use crate::error::{SymbolizeError, SymbolizeErrorKind};
use crate::reassembly::render_block;

/// The outcome of one symbolication run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolizedReport {
    /// Human-readable title embedding the resolved version, or explaining
    /// the failed stage.
    pub title: String,
    /// Header fields of the report, as `"<identifier> <value>"` strings.
    pub info: Vec<String>,
    /// Output lines per thread block, crashed thread first.
    pub blocks: Vec<Vec<String>>,
}

impl SymbolizedReport {
    fn failed(error: &SymbolizeError) -> Self {
        SymbolizedReport {
            title: format!("Symbolication failed: {error}"),
            ..SymbolizedReport::default()
        }
    }
}

/// Drives a crash report through scan, symbol retrieval, resolution and
/// reassembly.
///
/// All collaborators are owned: the configuration is passed in once at
/// construction time, the resolver is injected (production shells out to
/// `atos`), and the optional normalizer converts JSON incident reports to
/// text. One `Symbolizer` serves many runs.
pub struct Symbolizer<R = AtosResolver> {
    config: Config,
    scanner: CrashScanner,
    store: Option<SymbolStore>,
    engine: SymbolizationEngine<R>,
    normalizer: Option<Box<dyn ReportNormalizer>>,
}

impl Symbolizer<AtosResolver> {
    /// Creates a production pipeline resolving through the configured
    /// platform tool.
    pub fn new(config: Config) -> Result<Self, SymbolizeError> {
        let resolver = AtosResolver::new(&config.resolver);
        Self::with_resolver(config, resolver)
    }
}

impl<R: Resolve + 'static> Symbolizer<R> {
    /// Creates a pipeline over a custom resolver implementation.
    ///
    /// An unreachable symbol store is not fatal: the pipeline degrades to
    /// treating every lookup as a miss and logs the condition.
    pub fn with_resolver(config: Config, resolver: R) -> Result<Self, SymbolizeError> {
        let scanner = CrashScanner::new(&config.patterns)?;
        let store = match SymbolStore::open(&config.store) {
            Ok(store) => Some(store),
            Err(error) => {
                tracing::warn!(
                    db = %config.store.db_path.display(),
                    %error,
                    "symbol store unavailable, all lookups degrade to misses"
                );
                None
            }
        };
        let engine = SymbolizationEngine::new(resolver, config.resolver.max_concurrent_resolutions);

        Ok(Symbolizer {
            config,
            scanner,
            store,
            engine,
            normalizer: None,
        })
    }

    /// Installs the normalizer for JSON incident reports.
    pub fn with_normalizer(mut self, normalizer: Box<dyn ReportNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Symbolicates a report given as either inline content or a file path.
    ///
    /// Fails on invalid version or architecture, empty content, unreadable
    /// or imageless reports, and total download failure. Per-line resolver
    /// failures do not fail the run; affected lines fall back to their raw
    /// text or carry the resolver's diagnostic.
    pub async fn symbolize(
        &self,
        content_or_path: &str,
        version: &str,
        arch: &str,
        prefer_backup: bool,
    ) -> Result<SymbolizedReport, SymbolizeError> {
        if content_or_path.trim().is_empty() {
            return Err(SymbolizeErrorKind::EmptyContent.into());
        }
        if !self.scanner.patterns().version_is_valid(version) {
            return Err(SymbolizeErrorKind::InvalidVersion.into());
        }
        let mut version = AppVersion::parse(version)
            .map_err(|e| SymbolizeError::new(SymbolizeErrorKind::InvalidVersion, e))?;
        let mut arch = Arch::from_str(arch)
            .map_err(|e| SymbolizeError::new(SymbolizeErrorKind::InvalidArch, e))?;

        let mut report = self.scan(content_or_path)?;
        if report.blocks.is_empty() {
            return Err(ScanError::from(ScanErrorKind::NoStackBlocks).into());
        }

        // The report knows better than the caller which build actually
        // crashed and on which architecture.
        if let Some(embedded) = report.version.clone() {
            if embedded != version {
                tracing::info!(
                    requested = version.as_str(),
                    embedded = embedded.as_str(),
                    "report embeds a different version, using it"
                );
                version = embedded;
            }
        }
        if let Some(embedded) = report.arch {
            arch = embedded;
        }

        self.ensure_debug_paths(&mut report, &version, arch, prefer_backup)
            .await?;

        // Pin the version directory for the whole resolution phase. The
        // guard releases on every exit path, exactly once.
        let _lock = self.store.as_ref().map(|store| store.acquire_lock(&version));

        let max_blocks = self.config.resolver.max_thread_blocks;
        let requests = build_requests(&report.blocks, &report.images, arch, max_blocks);
        let results = self.engine.resolve_requests(requests).await;

        let blocks = report
            .blocks
            .iter()
            .take(max_blocks)
            .map(|block| render_block(block, &results))
            .collect();
        let info = report
            .info
            .iter()
            .map(|(key, value)| format!("{key} {value}"))
            .collect();

        Ok(SymbolizedReport {
            title: format!("Crash actual version is [{version}_{arch}]"),
            info,
            blocks,
        })
    }

    /// Symbolicates a report, never raising.
    ///
    /// Any failure is caught once at this boundary, logged with its
    /// context, and surfaced as an empty result with an explanatory title.
    /// Callers never see a half-populated result paired with an error.
    pub async fn run(
        &self,
        content_or_path: &str,
        version: &str,
        arch: &str,
        prefer_backup: bool,
    ) -> SymbolizedReport {
        match self.symbolize(content_or_path, version, arch, prefer_backup).await {
            Ok(report) => report,
            Err(error) => {
                tracing::error!(version, arch, %error, "symbolication run failed");
                SymbolizedReport::failed(&error)
            }
        }
    }

    fn scan(&self, content_or_path: &str) -> Result<ScanReport, ScanError> {
        let path = Path::new(content_or_path);
        if path.exists() {
            self.scanner.scan_file(path, self.normalizer.as_deref())
        } else {
            let dialect = ReportDialect::sniff(content_or_path);
            self.scanner
                .scan_content(content_or_path, dialect, self.normalizer.as_deref())
        }
    }

    /// Makes the debug files of all referenced binaries available locally:
    /// cache lookup first, then archive retrieval and bundle discovery for
    /// the misses.
    async fn ensure_debug_paths(
        &self,
        report: &mut ScanReport,
        version: &AppVersion,
        arch: Arch,
        prefer_backup: bool,
    ) -> Result<(), SymbolizeError> {
        let needed = referenced_identity_keys(report);
        if needed.is_empty() {
            return Ok(());
        }

        let cached = match &self.store {
            Some(store) => store.lookup(&needed, version, arch).unwrap_or_else(|error| {
                tracing::warn!(%error, "symbol lookup failed, degrading to misses");
                HashMap::new()
            }),
            None => HashMap::new(),
        };
        for (key, path) in &cached {
            report.images.set_debug_path(key, path.clone());
        }

        let missing: Vec<String> = needed
            .iter()
            .filter(|key| !cached.contains_key(*key))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let version_dir = self
            .config
            .store
            .symbol_dir
            .join(version.as_str())
            .join(arch.name());

        if has_debug_bundles(&version_dir) {
            tracing::info!(
                dir = %version_dir.display(),
                "debug bundles already extracted, skipping download"
            );
        } else {
            // Bound disk usage before fetching a new version.
            if let Some(store) = &self.store {
                if let Err(error) =
                    store.evict_old_versions(self.config.store.max_cached_versions)
                {
                    tracing::warn!(%error, "version eviction failed");
                }
            }

            fetch_symbols(
                &self.config.download,
                version,
                arch,
                &version_dir,
                prefer_backup,
            )
            .await?;
        }

        let limit = self.config.resolver.search_candidate_limit;
        let mut entries = Vec::new();
        for image in report.images.iter_mut() {
            if image.debug_path.is_some() {
                continue;
            }
            let key = image.identity_key();
            if !missing.contains(&key) {
                continue;
            }

            match locate_debug_file(&version_dir, &image.name, &image.name_from_binary, limit) {
                Some(path) => {
                    image.debug_path = Some(path.clone());
                    entries.push(SymbolCacheEntry {
                        identity_key: key,
                        version: version.clone(),
                        arch,
                        path,
                    });
                }
                None => tracing::debug!(
                    image = %image.name,
                    version = version.as_str(),
                    "no debug file found, frames stay unresolved"
                ),
            }
        }

        if !entries.is_empty() {
            if let Some(store) = &self.store {
                if let Err(error) = store.store(&entries) {
                    tracing::warn!(%error, "failed to persist discovered symbol paths");
                }
            }
        }

        Ok(())
    }
}

/// Identity keys of all binaries referenced by unresolved frame lines, in
/// first-reference order.
fn referenced_identity_keys(report: &ScanReport) -> Vec<String> {
    let mut keys = Vec::new();

    for block in &report.blocks {
        for line in &block.lines {
            let (name, load_address) = match line.kind {
                CrashLineKind::Stack(ref frame) => {
                    (frame.image_name.as_str(), Some(frame.load_address.as_str()))
                }
                CrashLineKind::Diagnostic(ref frame) if !frame.is_symbolized() => {
                    (frame.image_name.as_str(), None)
                }
                _ => continue,
            };

            let image = report.images.by_name(name).or_else(|| {
                load_address.and_then(|address| report.images.by_load_address(address))
            });

            if let Some(image) = image {
                let key = image.identity_key();
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
    }

    keys
}
