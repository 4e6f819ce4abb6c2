//! Output tree layout and file naming

use crate::types::OutputProfile;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Longest relative path (directory name + mirrored path) accepted by trackers
pub const PATH_LIMIT: usize = 180;

/// Characters replaced in output file basenames
const FORBIDDEN_FILE_CHARS: &[char] = &['?', '<', '>', '\\', '*', '|', '"'];

/// Characters removed from output directory names
const FORBIDDEN_DIR_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replace characters that are invalid on common filesystems with `_`
pub fn sanitize_basename(name: &str) -> String {
    name.chars()
        .map(|c| if FORBIDDEN_FILE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Directory name for a profile, e.g. `Artist - Album [MP3 - V0]`
pub fn profile_dir_name(name: &str, profile: OutputProfile) -> String {
    let qualified = format!("{} [{}]", name, profile.label());
    qualified
        .chars()
        .filter(|c| !FORBIDDEN_DIR_CHARS.contains(c))
        .collect()
}

/// Output directory of a batch under `output_root`
pub fn batch_output_dir(output_root: &Path, name: &str, profile: OutputProfile) -> PathBuf {
    output_root.join(profile_dir_name(name, profile))
}

/// Map a source file's parent directory into the output tree
pub fn mirror_dir(source_root: &Path, output_dir: &Path, file: &Path) -> PathBuf {
    let parent = file.parent().unwrap_or(source_root);
    match parent.strip_prefix(source_root) {
        Ok(rel) => output_dir.join(rel),
        Err(_) => output_dir.to_path_buf(),
    }
}

/// Output file path for a source, inside `output_dir`
pub fn output_file_path(output_dir: &Path, source: &Path, profile: OutputProfile) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{}{}", sanitize_basename(&stem), profile.extension()))
}

/// Check whether any file in `source_root`, placed under `dir_name`, exceeds
/// [`PATH_LIMIT`] characters
pub fn exceeds_path_limit(source_root: &Path, dir_name: &str) -> bool {
    WalkDir::new(source_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(source_root)
                .ok()
                .map(|rel| rel.to_string_lossy().chars().count())
        })
        .any(|rel_len| dir_name.chars().count() + 1 + rel_len > PATH_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_basename() {
        assert_eq!(sanitize_basename("What? <Live> \"Mix\" a|b*c\\d"), "What_ _Live_ _Mix_ a_b_c_d");
        assert_eq!(sanitize_basename("01 - Plain: Track"), "01 - Plain: Track");
    }

    #[test]
    fn test_profile_dir_name_strips_forbidden() {
        assert_eq!(
            profile_dir_name("AC/DC - Back: In Black", OutputProfile::Mp3V0),
            "ACDC - Back In Black [MP3 - V0]"
        );
        assert_eq!(
            profile_dir_name("Album", OutputProfile::Flac16),
            "Album [FLAC - Lossless]"
        );
    }

    #[test]
    fn test_mirror_dir() {
        let root = Path::new("/music/Album");
        let out = Path::new("/out/Album [MP3 - 320]");
        assert_eq!(
            mirror_dir(root, out, Path::new("/music/Album/CD1/01.flac")),
            PathBuf::from("/out/Album [MP3 - 320]/CD1")
        );
        assert_eq!(
            mirror_dir(root, out, Path::new("/music/Album/01.flac")),
            out.to_path_buf()
        );
    }

    #[test]
    fn test_output_file_path() {
        let path = output_file_path(
            Path::new("/out/CD1"),
            Path::new("/music/CD1/01 - Why?.flac"),
            OutputProfile::Mp3Cbr320,
        );
        assert_eq!(path, PathBuf::from("/out/CD1/01 - Why_.mp3"));
    }

    #[test]
    fn test_exceeds_path_limit() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("CD1")).unwrap();
        fs::write(dir.path().join("CD1").join(format!("{}.flac", "x".repeat(100))), b"").unwrap();

        assert!(!exceeds_path_limit(dir.path(), "Short [MP3 - V0]"));
        assert!(exceeds_path_limit(dir.path(), &"L".repeat(80)));
    }
}
