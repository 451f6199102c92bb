//! End-to-end archive retrieval for one `(version, architecture)` pair.

use std::path::Path;

use macsym_common::{AppVersion, Arch, DownloadConfig, SymbolSource};

use crate::archive::{extract_archive, validate_archive};
use crate::downloader::Downloader;
use crate::error::{RetrievalError, RetrievalErrorKind};

/// Downloads, validates and extracts the symbol archive for a version.
///
/// The primary source tier is tried first, then the backup tier; with
/// `prefer_backup` only the backup is used. Within one tier a validation
/// failure removes the corrupted file and retries the fetch once. An
/// extraction failure is terminal across tiers: the archive itself was
/// sound, so another download would not help, and the file is preserved for
/// manual recovery.
pub async fn fetch_symbols(
    config: &DownloadConfig,
    version: &AppVersion,
    arch: Arch,
    version_dir: &Path,
    prefer_backup: bool,
) -> Result<(), RetrievalError> {
    let tiers: Vec<(&str, &SymbolSource)> = if prefer_backup {
        vec![("backup", &config.backup)]
    } else {
        vec![("primary", &config.primary), ("backup", &config.backup)]
    };

    let mut last_error: Option<RetrievalError> = None;

    for (tier_name, tier) in tiers {
        if !tier.is_configured(arch) {
            continue;
        }

        let url = tier.archive_url(version, arch, &config.archive_name);
        match fetch_from_tier(config, tier, &url, version_dir).await {
            Ok(()) => return Ok(()),
            Err(error) if error.kind() == RetrievalErrorKind::Extraction => return Err(error),
            Err(error) if error.kind() == RetrievalErrorKind::ToolMissing => return Err(error),
            Err(error) => {
                tracing::warn!(
                    tier = tier_name,
                    %url,
                    version = version.as_str(),
                    arch = %arch,
                    %error,
                    "source tier failed"
                );
                last_error = Some(error);
            }
        }
    }

    Err(match last_error {
        Some(error) => RetrievalError::new(RetrievalErrorKind::SourcesExhausted, error),
        None => RetrievalErrorKind::SourcesExhausted.into(),
    })
}

async fn fetch_from_tier(
    config: &DownloadConfig,
    tier: &SymbolSource,
    url: &str,
    version_dir: &Path,
) -> Result<(), RetrievalError> {
    let archive_path = version_dir.join(&config.archive_name);
    let downloader = Downloader::new(config, tier.credentials.clone())?;

    // One retry of the whole fetch after a validation failure; the first
    // download may simply have been corrupted in transit.
    let mut attempt = 0;
    let format = loop {
        if attempt > 0 {
            if archive_path.exists() {
                tracing::info!(path = %archive_path.display(), "removing corrupted archive before retry");
                std::fs::remove_file(&archive_path)?;
            }
        }

        downloader.download_file(url, &archive_path).await?;

        match validate_archive(&archive_path) {
            Ok(format) => break format,
            Err(error) if attempt == 0 => {
                tracing::warn!(%error, "archive validation failed, retrying fetch once");
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    };

    tracing::debug!(?format, "archive validated, extracting");
    extract_archive(&archive_path, version_dir).await?;

    // Extraction succeeded, the archive has served its purpose.
    if let Err(error) = std::fs::remove_file(&archive_path) {
        tracing::warn!(path = %archive_path.display(), %error, "failed to remove extracted archive");
    }

    Ok(())
}
