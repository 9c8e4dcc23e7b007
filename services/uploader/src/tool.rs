//! rclone executable lookup
//!
//! Resolution order:
//! 1. `rclone.binary` from config (must exist)
//! 2. `rclone` on PATH
//! 3. an `rclone` binary in one of the fallback directories (next to the
//!    uploader executable, next to the accounts directory)

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

#[cfg(windows)]
const RCLONE_FILE_NAME: &str = "rclone.exe";
#[cfg(not(windows))]
const RCLONE_FILE_NAME: &str = "rclone";

const INSTALL_HINT: &str = "install rclone from https://rclone.org/downloads/";

/// Find the rclone executable.
pub fn locate_rclone(configured: Option<&Path>, fallback_dirs: &[PathBuf]) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            info!(path = %path.display(), "using configured rclone");
            return Ok(path.to_path_buf());
        }
        return Err(Error::RcloneNotFound(format!(
            "configured binary {} does not exist",
            path.display()
        )));
    }

    if let Ok(path) = which::which("rclone") {
        info!(path = %path.display(), "using rclone from PATH");
        return Ok(path);
    }

    for dir in fallback_dirs {
        let candidate = dir.join(RCLONE_FILE_NAME);
        debug!(candidate = %candidate.display(), "checking for rclone");
        if candidate.is_file() {
            info!(path = %candidate.display(), "using local rclone");
            return Ok(candidate);
        }
    }

    Err(Error::RcloneNotFound(INSTALL_HINT.into()))
}

/// Directories searched after PATH: the uploader's own directory and the parent
/// of the accounts directory.
pub fn fallback_dirs(accounts_dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        dirs.push(dir);
    }
    if let Some(parent) = accounts_dir.parent() {
        let parent = if parent.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            parent.to_path_buf()
        };
        if !dirs.contains(&parent) {
            dirs.push(parent);
        }
    }
    dirs
}
