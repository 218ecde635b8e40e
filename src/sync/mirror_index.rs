//! The copy of the index kept inside the mirror directory.
//!
//! With `--write-index` the fetched index is saved as `Packages` next to
//! the packages, which makes the mirror usable as an opkg feed. The saved
//! copy also tells `--prune` what the previous pass mirrored.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::fs;

use super::paths;
use crate::index::{IndexParser, PackageRecord};

/// File name of the saved index inside the mirror.
pub const SAVED_INDEX_NAME: &str = "Packages";

/// Atomically replace the saved index with `text`.
pub async fn write_saved_index(directory: &Path, text: &str) -> anyhow::Result<()> {
    let target = directory.join(SAVED_INDEX_NAME);
    let part = paths::part_path(&target);
    fs::write(&part, text)
        .await
        .with_context(|| format!("Failed to write {}", part.display()))?;
    if let Err(e) = fs::rename(&part, &target).await {
        let _ = fs::remove_file(&part).await;
        return Err(e).with_context(|| format!("Failed to replace {}", target.display()));
    }
    tracing::info!("Wrote index to {}", target.display());
    Ok(())
}

/// Read the saved index, if one exists.
async fn read_saved_index(directory: &Path) -> anyhow::Result<Option<String>> {
    let path = directory.join(SAVED_INDEX_NAME);
    match fs::read_to_string(&path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Delete package files the saved index lists but `current` no longer does.
///
/// Returns the paths removed (or, in a dry run, the paths that would be).
/// Without a saved index there is nothing to compare against and nothing
/// is touched. Failing to delete one file is logged and skipped.
pub async fn prune_removed(
    directory: &Path,
    current: &[PackageRecord],
    dry_run: bool,
) -> anyhow::Result<Vec<PathBuf>> {
    let Some(text) = read_saved_index(directory).await? else {
        tracing::debug!("No saved index in {}, nothing to prune", directory.display());
        return Ok(Vec::new());
    };

    let keep: HashSet<PathBuf> = current
        .iter()
        .filter_map(|r| paths::relative_package_path(&r.filename))
        .collect();

    let mut removed = Vec::new();
    // Warnings for the old index were already reported when it was fetched.
    for previous in IndexParser::new(&text).filter_map(Result::ok) {
        let Some(rel) = paths::relative_package_path(&previous.filename) else {
            tracing::warn!(
                "Saved index lists unsafe filename {:?}, not pruning it",
                previous.filename
            );
            continue;
        };
        if keep.contains(&rel) {
            continue;
        }
        let path = directory.join(&rel);
        if dry_run {
            if path.exists() {
                tracing::info!("[DRY RUN] Would remove {}", path.display());
                removed.push(path);
            }
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Removed {} ({})", path.display(), previous.display_name());
                removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parse_index;

    #[tokio::test]
    async fn test_write_saved_index_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SAVED_INDEX_NAME), "old").unwrap();

        write_saved_index(dir.path(), "Filename: a.ipk\n").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join(SAVED_INDEX_NAME)).unwrap(),
            "Filename: a.ipk\n"
        );
        assert!(!dir.path().join("Packages.part").exists());
    }

    #[tokio::test]
    async fn test_prune_without_saved_index_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ipk"), "a").unwrap();

        let removed = prune_removed(dir.path(), &[], false).await.unwrap();

        assert!(removed.is_empty());
        assert!(dir.path().join("a.ipk").exists());
    }

    #[tokio::test]
    async fn test_prune_removes_only_vanished_packages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SAVED_INDEX_NAME),
            "Package: a\nFilename: a.ipk\n\nPackage: old\nFilename: sub/old.ipk\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("a.ipk"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("old.ipk"), "old").unwrap();
        std::fs::write(dir.path().join("unlisted.ipk"), "keep me").unwrap();

        let current = parse_index("Package: a\nFilename: ./a.ipk\n").records;
        let removed = prune_removed(dir.path(), &current, false).await.unwrap();

        assert_eq!(removed, vec![dir.path().join("sub").join("old.ipk")]);
        assert!(dir.path().join("a.ipk").exists());
        assert!(dir.path().join("unlisted.ipk").exists());
        assert!(!dir.path().join("sub").join("old.ipk").exists());
    }

    #[tokio::test]
    async fn test_prune_dry_run_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SAVED_INDEX_NAME), "Filename: old.ipk\n").unwrap();
        std::fs::write(dir.path().join("old.ipk"), "old").unwrap();

        let removed = prune_removed(dir.path(), &[], true).await.unwrap();

        assert_eq!(removed, vec![dir.path().join("old.ipk")]);
        assert!(dir.path().join("old.ipk").exists());
    }

    #[tokio::test]
    async fn test_prune_skips_unsafe_saved_entries() {
        let outer = tempfile::tempdir().unwrap();
        let mirror = outer.path().join("mirror");
        std::fs::create_dir(&mirror).unwrap();
        std::fs::write(outer.path().join("victim"), "x").unwrap();
        std::fs::write(mirror.join(SAVED_INDEX_NAME), "Filename: ../victim\n").unwrap();

        let removed = prune_removed(&mirror, &[], false).await.unwrap();

        assert!(removed.is_empty());
        assert!(outer.path().join("victim").exists());
    }
}
