//! Credential discovery
//!
//! Scans a directory for credential files (service-account JSON by default).
//! Discovery order is the file-name order, so two runs over the same directory
//! build the same pool. Subdirectories and hidden files are ignored.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// File extension scanned for when none is configured.
pub const DEFAULT_EXTENSION: &str = "json";

/// Opaque reference to one credential file.
///
/// `id` is the file stem and is what shows up in logs and reports; `path` is
/// what the transfer tool receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub id: String,
    pub path: PathBuf,
}

impl Credential {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// Build a credential from a file path, using the file stem as the id.
    pub fn from_path(path: PathBuf) -> Self {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { id, path }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Discover credential files in `dir` with the given extension.
///
/// The extension match is case-insensitive and given without the leading dot.
/// An existing directory with no matching files yields an empty list; the
/// caller decides whether that is fatal.
pub async fn discover(dir: &Path, extension: &str) -> Result<Vec<Credential>> {
    if !dir.is_dir() {
        return Err(Error::DirectoryNotFound(dir.display().to_string()));
    }

    let extension = extension.trim_start_matches('.');
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| Error::Io(format!("reading {}: {e}", dir.display())))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::Io(format!("reading {}: {e}", dir.display())))?
    {
        let path = entry.path();
        if !matches_extension(&path, extension) {
            continue;
        }
        if is_hidden(&path) {
            debug!(path = %path.display(), "skipping hidden credential file");
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| Error::Io(format!("inspecting {}: {e}", path.display())))?;
        if file_type.is_dir() {
            continue;
        }
        paths.push(path);
    }

    paths.sort();
    let credentials: Vec<Credential> = paths.into_iter().map(Credential::from_path).collect();

    if credentials.is_empty() {
        warn!(dir = %dir.display(), extension, "no credential files found");
    } else {
        info!(
            dir = %dir.display(),
            credentials = credentials.len(),
            "discovered credentials"
        );
    }
    Ok(credentials)
}

fn matches_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
