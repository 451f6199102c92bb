//! Bounded debug-bundle discovery inside an extracted version directory.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Searches a version directory for a debug bundle matching a binary name.
///
/// Matches directories whose name starts with `name` (a `.dSYM` bundle is a
/// directory), then retries with `fallback`. At most `limit` candidates are
/// examined per name so a huge symbol tree cannot stall the pipeline.
pub fn find_debug_bundle(
    version_dir: &Path,
    name: &str,
    fallback: &str,
    limit: usize,
) -> Option<PathBuf> {
    for candidate in [name, fallback] {
        if candidate.is_empty() {
            continue;
        }
        if let Some(found) = find_dir_with_prefix(version_dir, candidate, limit) {
            return Some(found);
        }
    }

    None
}

fn find_dir_with_prefix(root: &Path, prefix: &str, limit: usize) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|file_name| file_name.starts_with(prefix))
        })
        .take(limit)
        .map(|entry| entry.into_path())
        .next()
}

/// Resolves the resolver-ready debug file inside a `.dSYM` bundle.
///
/// The DWARF data lives at `<bundle>/Contents/Resources/DWARF/<binary>`.
/// When the DWARF directory holds a single file that file wins; otherwise
/// the entry the image name starts with.
pub fn dwarf_member(bundle: &Path, image_name: &str) -> Option<PathBuf> {
    let dwarf_dir = bundle.join("Contents/Resources/DWARF");
    let entries: Vec<PathBuf> = fs::read_dir(&dwarf_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .collect();

    if entries.len() == 1 {
        return entries.into_iter().next();
    }

    entries.into_iter().find(|path| {
        path.file_name()
            .and_then(|file_name| file_name.to_str())
            .is_some_and(|file_name| image_name.starts_with(file_name))
    })
}

/// Finds the resolver-ready debug file for an image in one step.
pub fn locate_debug_file(
    version_dir: &Path,
    name: &str,
    fallback: &str,
    limit: usize,
) -> Option<PathBuf> {
    let bundle = find_debug_bundle(version_dir, name, fallback, limit)?;
    dwarf_member(&bundle, name)
}

/// Whether a version directory already holds at least one extracted
/// debug bundle.
pub fn has_debug_bundles(version_dir: &Path) -> bool {
    WalkDir::new(version_dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| {
            entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|file_name| file_name.ends_with(".dSYM"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bundle(root: &Path, name: &str, members: &[&str]) -> PathBuf {
        let bundle = root.join(format!("{name}.dSYM"));
        let dwarf = bundle.join("Contents/Resources/DWARF");
        fs::create_dir_all(&dwarf).unwrap();
        for member in members {
            fs::write(dwarf.join(member), b"").unwrap();
        }
        bundle
    }

    #[test]
    fn test_locate_by_primary_name() {
        let dir = tempfile::tempdir().unwrap();
        make_bundle(dir.path(), "libscf.dylib", &["libscf.dylib"]);

        let found = locate_debug_file(dir.path(), "libscf.dylib", "", 5).unwrap();
        assert!(found.ends_with("libscf.dylib.dSYM/Contents/Resources/DWARF/libscf.dylib"));
    }

    #[test]
    fn test_locate_by_fallback_name() {
        let dir = tempfile::tempdir().unwrap();
        make_bundle(dir.path(), "WebexTeams", &["WebexTeams"]);

        // The display name finds nothing, the image row name does.
        let bundle = find_debug_bundle(dir.path(), "Webex Helper", "WebexTeams", 5).unwrap();
        assert!(bundle.ends_with("WebexTeams.dSYM"));
    }

    #[test]
    fn test_single_dwarf_member_wins() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = make_bundle(dir.path(), "Webex", &["SomethingElse"]);

        let member = dwarf_member(&bundle, "Webex").unwrap();
        assert!(member.ends_with("SomethingElse"));
    }

    #[test]
    fn test_multiple_members_match_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = make_bundle(dir.path(), "Webex", &["Webex", "Other"]);

        let member = dwarf_member(&bundle, "Webex Teams").unwrap();
        assert!(member.ends_with("DWARF/Webex"));
    }

    #[test]
    fn test_missing_bundle() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(locate_debug_file(dir.path(), "Ghost", "", 5), None);
        assert!(!has_debug_bundles(dir.path()));
    }

    #[test]
    fn test_has_debug_bundles() {
        let dir = tempfile::tempdir().unwrap();
        make_bundle(dir.path(), "Webex", &["Webex"]);
        assert!(has_debug_bundles(dir.path()));
    }
}
