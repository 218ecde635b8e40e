use std::path::{Path, PathBuf};

use anyhow::Context;
use reqwest::Url;

use super::error::DownloadError;

/// Turn an index `Filename` into a path relative to the mirror root.
///
/// The remote layout is preserved (`pool/a/foo.ipk` stays nested) so that
/// same-named files in different subdirectories never collide. Absolute
/// paths, `..`, backslashes and drive prefixes are rejected: the index is
/// remote input and must not write outside the mirror.
pub fn relative_package_path(filename: &str) -> Option<PathBuf> {
    if filename.starts_with('/') || filename.contains('\\') {
        return None;
    }
    let mut path = PathBuf::new();
    for component in filename.split('/') {
        match component {
            "" | "." => continue,
            ".." => return None,
            c if c.contains(':') => return None,
            c => path.push(c),
        }
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

/// Local destination for a package inside `directory`.
pub fn local_package_path(directory: &Path, filename: &str) -> Result<PathBuf, DownloadError> {
    relative_package_path(filename)
        .map(|rel| directory.join(rel))
        .ok_or_else(|| DownloadError::InvalidPath(filename.to_string()))
}

/// Temporary path a download is streamed into before the final rename.
/// Lives next to the destination so the rename never crosses filesystems.
pub fn part_path(download_path: &Path) -> PathBuf {
    let mut name = download_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    download_path.with_file_name(name)
}

/// Remote URL of a package, resolved relative to the index URL.
///
/// `Filename` is a literal path, so each segment is percent-encoded:
/// `#` and `?` in a name are part of the file, not a fragment or query.
pub fn package_url(index_url: &Url, filename: &str) -> Result<Url, DownloadError> {
    if relative_package_path(filename).is_none() {
        return Err(DownloadError::InvalidPath(filename.to_string()));
    }
    let mut url = index_url
        .join("./")
        .with_context(|| format!("Cannot resolve directory of {}", index_url))
        .map_err(DownloadError::Other)?;
    url.path_segments_mut()
        .map_err(|()| {
            DownloadError::Other(anyhow::anyhow!("{} cannot hold a package path", index_url))
        })?
        .pop_if_empty()
        .extend(filename.split('/').filter(|s| !s.is_empty() && *s != "."));
    Ok(url)
}
