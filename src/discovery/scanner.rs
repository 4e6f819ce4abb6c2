//! Source and ancillary file scanning

use crate::error::{FlacpipeError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Extension of transcodable sources (compared case-insensitively)
pub const SOURCE_EXTENSION: &str = "flac";

/// Non-audio files carried over into a finished transcode
pub const ANCILLARY_EXTENSIONS: &[&str] = &[
    "cue", "gif", "jpeg", "jpg", "log", "md5", "nfo", "pdf", "png", "sfv", "txt",
];

/// Find every FLAC file under `root`, sorted by path
pub fn scan(root: &Path) -> Result<Vec<PathBuf>> {
    let files = locate(root, |ext| ext == SOURCE_EXTENSION)?;

    info!("Discovered {} FLAC files", files.len());
    if files.is_empty() {
        warn!("No FLAC files found in {}", root.display());
    }

    Ok(files)
}

/// Find every allow-listed ancillary file under `root`, sorted by path
pub fn ancillary_files(root: &Path) -> Result<Vec<PathBuf>> {
    locate(root, |ext| ANCILLARY_EXTENSIONS.contains(&ext))
}

/// Walk `root` for non-hidden regular files whose lowercased extension matches
fn locate(root: &Path, matches: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(FlacpipeError::FileNotFound(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() || is_hidden(&entry) {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        if ext.as_deref().is_some_and(&matches) {
            debug!("Discovered: {}", entry.path().display());
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}
