//! The persistent symbol cache for `macsym`.
//!
//! The store has two halves that must stay consistent:
//!
//!  - a SQLite table mapping `(identity key, architecture)` to the local
//!    debug file serving that binary, additionally indexed by version, and
//!  - on-disk version directories (`<symbol_dir>/<version>/<arch>/`) holding
//!    the extracted debug bundles the table points into.
//!
//! Both are shared between independent processes, which is why directory
//! pinning uses [`VersionLock`] marker files rather than an in-process
//! mutex, and why eviction deletes a version's directory tree and its table
//! rows together.

#![warn(missing_docs)]

mod discover;
mod error;
mod lock;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection};

use macsym_common::{AppVersion, Arch, StoreConfig};

pub use crate::discover::*;
pub use crate::error::*;
pub use crate::lock::*;

/// One row of the symbol table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolCacheEntry {
    /// Binary identity: the image UUID, or its load address for dialects
    /// without UUIDs.
    pub identity_key: String,
    /// The application version the debug file belongs to.
    pub version: AppVersion,
    /// The architecture the debug file was built for.
    pub arch: Arch,
    /// Resolver-ready path of the debug file.
    pub path: PathBuf,
}

/// The persistent symbol version store.
pub struct SymbolStore {
    conn: Mutex<Connection>,
    symbol_dir: PathBuf,
}

impl SymbolStore {
    /// Opens (and if necessary creates) the store described by the
    /// configuration.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.symbol_dir)?;
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS symbol_paths (
                identity_key TEXT NOT NULL,
                arch         TEXT NOT NULL,
                version      TEXT NOT NULL,
                path         TEXT NOT NULL,
                PRIMARY KEY (identity_key, arch)
            );
            CREATE INDEX IF NOT EXISTS symbol_paths_version
                ON symbol_paths (version);",
        )?;

        Ok(SymbolStore {
            conn: Mutex::new(conn),
            symbol_dir: config.symbol_dir.clone(),
        })
    }

    /// The root directory of all cached version directories.
    pub fn symbol_dir(&self) -> &Path {
        &self.symbol_dir
    }

    /// The directory holding one version's bundles for one architecture.
    pub fn version_dir(&self, version: &AppVersion, arch: Arch) -> PathBuf {
        self.symbol_dir.join(version.as_str()).join(arch.name())
    }

    /// Point query for the given identity keys, restricted to one version
    /// and architecture. Keys absent from the result are cache misses.
    pub fn lookup(
        &self,
        identity_keys: &[String],
        version: &AppVersion,
        arch: Arch,
    ) -> Result<HashMap<String, PathBuf>, StoreError> {
        if identity_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; identity_keys.len()].join(", ");
        let sql = format!(
            "SELECT identity_key, path FROM symbol_paths
             WHERE arch = ? AND version = ? AND identity_key IN ({placeholders})"
        );

        let conn = self.conn.lock().expect("symbol store poisoned");
        let mut statement = conn.prepare(&sql)?;

        let arch = arch.name();
        let version = version.as_str();
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&arch, &version];
        for key in identity_keys {
            params.push(key);
        }

        let mut found = HashMap::new();
        let mut rows = statement.query(params.as_slice())?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let path: String = row.get(1)?;
            found.insert(key, PathBuf::from(path));
        }

        Ok(found)
    }

    /// Batch upsert; idempotent per `(identity key, architecture)`.
    pub fn store(&self, entries: &[SymbolCacheEntry]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock().expect("symbol store poisoned");
        let tx = conn.transaction()?;
        let mut stored = 0;

        {
            let mut statement = tx.prepare(
                "INSERT OR REPLACE INTO symbol_paths (identity_key, arch, version, path)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                statement.execute(params![
                    entry.identity_key,
                    entry.arch.name(),
                    entry.version.as_str(),
                    entry.path.to_string_lossy(),
                ])?;
                stored += 1;
            }
        }

        tx.commit()?;
        tracing::debug!(stored, "symbol paths stored");
        Ok(stored)
    }

    /// Deletes the oldest cached versions beyond `max_kept`.
    ///
    /// Versions sort by numeric dotted-version order, oldest first. A
    /// version directory holding a lock file is in use and skipped, even if
    /// it is the oldest; the walk continues to the next-oldest candidate
    /// until the quota is met or candidates run out. Deleting a version
    /// removes its directory tree and its table rows.
    pub fn evict_old_versions(&self, max_kept: usize) -> Result<Vec<AppVersion>, StoreError> {
        let mut versions = self.cached_versions()?;
        if versions.len() <= max_kept {
            return Ok(Vec::new());
        }

        versions.sort();
        let mut excess = versions.len() - max_kept;
        let mut evicted = Vec::new();

        for version in versions {
            if excess == 0 {
                break;
            }

            let dir = self.symbol_dir.join(version.as_str());
            if lock::is_locked(&dir) {
                tracing::debug!(version = version.as_str(), "version locked, not evicting");
                continue;
            }

            if let Err(error) = fs::remove_dir_all(&dir) {
                tracing::warn!(version = version.as_str(), %error, "failed to remove version directory");
                continue;
            }

            let conn = self.conn.lock().expect("symbol store poisoned");
            conn.execute(
                "DELETE FROM symbol_paths WHERE version = ?1",
                params![version.as_str()],
            )?;
            drop(conn);

            tracing::info!(version = version.as_str(), "evicted cached version");
            evicted.push(version);
            excess -= 1;
        }

        Ok(evicted)
    }

    /// Acquires a lock pinning the given version's directory.
    ///
    /// A no-op handle is returned when the directory does not exist or the
    /// marker file cannot be created; locking failures never block
    /// symbolication.
    pub fn acquire_lock(&self, version: &AppVersion) -> VersionLock {
        VersionLock::acquire(&self.symbol_dir.join(version.as_str()))
    }

    /// All versions present as directories under the symbol root.
    fn cached_versions(&self) -> Result<Vec<AppVersion>, StoreError> {
        let mut versions = Vec::new();

        for entry in fs::read_dir(&self.symbol_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            // Non-version directories under the root are not ours to manage.
            if let Ok(version) = AppVersion::parse(&name) {
                versions.push(version);
            }
        }

        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn store_in(dir: &Path) -> SymbolStore {
        SymbolStore::open(&StoreConfig {
            symbol_dir: dir.to_path_buf(),
            db_path: dir.join("macsym.db"),
            max_cached_versions: 10,
        })
        .unwrap()
    }

    fn entry(key: &str, version: &str, arch: Arch, path: &str) -> SymbolCacheEntry {
        SymbolCacheEntry {
            identity_key: key.into(),
            version: AppVersion::parse(version).unwrap(),
            arch,
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let version = AppVersion::parse("44.10.0.30800").unwrap();

        store
            .store(&[entry(
                "5bf5c5ba-c53d-3e48-a8b3-deadbeef0001",
                "44.10.0.30800",
                Arch::X86_64,
                "/symbols/44.10.0.30800/x86_64/Webex.dSYM/Contents/Resources/DWARF/Webex",
            )])
            .unwrap();

        let found = store
            .lookup(
                &["5bf5c5ba-c53d-3e48-a8b3-deadbeef0001".to_owned()],
                &version,
                Arch::X86_64,
            )
            .unwrap();

        assert_eq!(
            found["5bf5c5ba-c53d-3e48-a8b3-deadbeef0001"],
            PathBuf::from(
                "/symbols/44.10.0.30800/x86_64/Webex.dSYM/Contents/Resources/DWARF/Webex"
            )
        );
    }

    #[test]
    fn test_lookup_is_arch_and_version_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let keys = vec!["key-1".to_owned()];

        store
            .store(&[entry("key-1", "44.1.0.1", Arch::X86_64, "/p/x86")])
            .unwrap();

        let version = AppVersion::parse("44.1.0.1").unwrap();
        assert!(store.lookup(&keys, &version, Arch::Arm64).unwrap().is_empty());

        let other_version = AppVersion::parse("44.2.0.1").unwrap();
        assert!(store
            .lookup(&keys, &other_version, Arch::X86_64)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_store_is_idempotent_per_identity_and_arch() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let version = AppVersion::parse("44.1.0.1").unwrap();

        store
            .store(&[
                entry("key-1", "44.1.0.1", Arch::X86_64, "/old"),
                entry("key-1", "44.1.0.1", Arch::X86_64, "/new"),
            ])
            .unwrap();

        let found = store
            .lookup(&["key-1".to_owned()], &version, Arch::X86_64)
            .unwrap();
        assert_eq!(found["key-1"], PathBuf::from("/new"));
    }

    #[test]
    fn test_eviction_is_oldest_first_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        // "44.9" sorts after "44.10" as a string but before it numerically.
        for version in ["44.9.0.100", "44.10.0.5", "44.11.0.1"] {
            fs::create_dir_all(dir.path().join(version)).unwrap();
        }

        let evicted = store.evict_old_versions(2).unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].as_str(), "44.9.0.100");
        assert!(!dir.path().join("44.9.0.100").exists());
        assert!(dir.path().join("44.10.0.5").exists());
    }

    #[test]
    fn test_eviction_skips_locked_versions() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        for version in ["44.1.0.1", "44.2.0.1", "44.3.0.1"] {
            fs::create_dir_all(dir.path().join(version)).unwrap();
        }
        let oldest = AppVersion::parse("44.1.0.1").unwrap();
        let lock = store.acquire_lock(&oldest);
        assert!(lock.is_held());

        let evicted = store.evict_old_versions(1).unwrap();

        // The locked oldest version survives; the quota is met from the
        // next-oldest candidates.
        assert!(dir.path().join("44.1.0.1").exists());
        assert_eq!(
            evicted.iter().map(AppVersion::as_str).collect::<Vec<_>>(),
            vec!["44.2.0.1", "44.3.0.1"]
        );

        lock.release();
    }

    #[test]
    fn test_eviction_removes_table_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let version = AppVersion::parse("44.1.0.1").unwrap();

        fs::create_dir_all(dir.path().join("44.1.0.1")).unwrap();
        fs::create_dir_all(dir.path().join("44.2.0.1")).unwrap();
        store
            .store(&[entry("key-1", "44.1.0.1", Arch::X86_64, "/p")])
            .unwrap();

        store.evict_old_versions(1).unwrap();

        let found = store
            .lookup(&["key-1".to_owned()], &version, Arch::X86_64)
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_eviction_ignores_foreign_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        fs::create_dir_all(dir.path().join("not-a-version")).unwrap();
        fs::create_dir_all(dir.path().join("44.1.0.1")).unwrap();

        assert!(store.evict_old_versions(1).unwrap().is_empty());
        assert!(dir.path().join("not-a-version").exists());
    }
}
