//! Inspection and tagging using lofty
//!
//! Reads FLAC stream info for the planner and copies Vorbis comments onto
//! outputs, re-mapped to whatever tag format the output file uses (ID3v2 for
//! MP3, Vorbis comments for FLAC).

use super::release::ReleaseTags;
use super::traits::{AssetInspector, TagCheck, TagHandler};
use crate::error::{FlacpipeError, Result};
use crate::types::SourceAsset;
use lofty::{Accessor, AudioFile, Probe, TagExt, TaggedFileExt};
use std::path::Path;
use tracing::debug;

/// Stream property reader
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyInspector;

impl LoftyInspector {
    pub fn new() -> Self {
        Self
    }
}

impl AssetInspector for LoftyInspector {
    fn inspect(&self, path: &Path) -> Result<SourceAsset> {
        let tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|e| FlacpipeError::unreadable(path, e.to_string()))?;
        let properties = tagged_file.properties();

        let sample_rate = properties
            .sample_rate()
            .ok_or_else(|| FlacpipeError::unreadable(path, "missing sample rate"))?;
        let bit_depth = properties
            .bit_depth()
            .ok_or_else(|| FlacpipeError::unreadable(path, "missing bit depth"))?;
        let channel_count = properties
            .channels()
            .ok_or_else(|| FlacpipeError::unreadable(path, "missing channel count"))?;

        debug!(
            "Inspected {}: {} Hz, {} bit, {} ch",
            path.display(),
            sample_rate,
            bit_depth,
            channel_count
        );

        Ok(SourceAsset::new(path, sample_rate, bit_depth, channel_count))
    }

    fn name(&self) -> &'static str {
        "lofty"
    }
}

/// Tag copier and validator
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagger;

impl LoftyTagger {
    pub fn new() -> Self {
        Self
    }
}

impl TagHandler for LoftyTagger {
    fn copy_tags(&self, source: &Path, dest: &Path) -> Result<()> {
        let source_file = Probe::open(source)
            .and_then(|probe| probe.read())
            .map_err(|e| FlacpipeError::unreadable(source, e.to_string()))?;

        let Some(tag) = source_file
            .primary_tag()
            .or_else(|| source_file.first_tag())
        else {
            debug!("No tags to copy from {}", source.display());
            return Ok(());
        };

        let dest_file = Probe::open(dest)
            .and_then(|probe| probe.read())
            .map_err(|e| tag_error(dest, e))?;

        let mut tag = tag.clone();
        tag.re_map(dest_file.primary_tag_type());
        tag.save_to_path(dest).map_err(|e| tag_error(dest, e))?;

        debug!("Copied tags {} -> {}", source.display(), dest.display());
        Ok(())
    }

    fn check_tags(&self, path: &Path) -> Result<TagCheck> {
        let tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|e| tag_error(path, e))?;

        let Some(tag) = tagged_file.primary_tag() else {
            return Ok(TagCheck::failed("no tags found"));
        };

        let check = if tag.artist().is_none() {
            TagCheck::failed("missing artist")
        } else if tag.album().is_none() {
            TagCheck::failed("missing album")
        } else if tag.title().is_none() {
            TagCheck::failed("missing title")
        } else if tag.track().is_none() {
            TagCheck::failed("missing track number")
        } else {
            TagCheck::ok()
        };

        Ok(check)
    }

    fn release_tags(&self, path: &Path) -> Result<ReleaseTags> {
        let tagged_file = Probe::open(path)
            .and_then(|probe| probe.read())
            .map_err(|e| FlacpipeError::unreadable(path, e.to_string()))?;

        let Some(tag) = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
        else {
            return Ok(ReleaseTags::default());
        };

        Ok(ReleaseTags {
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            year: tag.year(),
        })
    }

    fn name(&self) -> &'static str {
        "lofty"
    }
}

fn tag_error(path: &Path, err: lofty::error::LoftyError) -> FlacpipeError {
    FlacpipeError::TagValidation {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.flac");
        fs::write(&path, b"This is not a valid FLAC file").unwrap();

        let result = LoftyInspector::new().inspect(&path);
        assert!(matches!(result, Err(FlacpipeError::UnreadableAsset { .. })));
    }

    #[test]
    fn test_inspect_missing_file() {
        let result = LoftyInspector::new().inspect(Path::new("/nonexistent/a.flac"));
        assert!(matches!(result, Err(FlacpipeError::UnreadableAsset { .. })));
    }

    /// Minimal FLAC: STREAMINFO, optional VORBIS_COMMENT, then a final PADDING
    /// block and a few bytes standing in for audio frames
    fn flac_bytes(sample_rate: u32, bits: u8, channels: u8, comments: &[&str]) -> Vec<u8> {
        let mut bytes = b"fLaC".to_vec();

        bytes.push(0x00);
        bytes.extend_from_slice(&[0, 0, 34]);
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&4096u16.to_be_bytes());
        bytes.extend_from_slice(&[0; 6]);
        let packed = (u64::from(sample_rate) << 44)
            | (u64::from(channels - 1) << 41)
            | (u64::from(bits - 1) << 36)
            | 44_100;
        bytes.extend_from_slice(&packed.to_be_bytes());
        bytes.extend_from_slice(&[0; 16]);

        if !comments.is_empty() {
            let vendor = b"flacpipe";
            let mut block = Vec::new();
            block.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
            block.extend_from_slice(vendor);
            block.extend_from_slice(&(comments.len() as u32).to_le_bytes());
            for comment in comments {
                block.extend_from_slice(&(comment.len() as u32).to_le_bytes());
                block.extend_from_slice(comment.as_bytes());
            }
            bytes.push(0x04);
            bytes.extend_from_slice(&(block.len() as u32).to_be_bytes()[1..]);
            bytes.extend_from_slice(&block);
        }

        bytes.push(0x81);
        bytes.extend_from_slice(&[0, 0, 16]);
        bytes.extend_from_slice(&[0; 16]);

        bytes.extend_from_slice(&[0xFF, 0xF8, 0x69, 0x08, 0x00, 0x00]);
        bytes
    }

    const FULL_TAGS: &[&str] = &[
        "ARTIST=Boards of Canada",
        "ALBUM=Geogaddi",
        "TITLE=Music Is Math",
        "TRACKNUMBER=3",
        "DATE=2002",
    ];

    #[test]
    fn test_inspect_reads_stream_info() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hires.flac");
        fs::write(&path, flac_bytes(96_000, 24, 2, &[])).unwrap();

        let asset = LoftyInspector::new().inspect(&path).unwrap();
        assert_eq!(asset, SourceAsset::new(&path, 96_000, 24, 2));
    }

    #[test]
    fn test_copy_tags_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.flac");
        let dest = dir.path().join("dest.flac");
        fs::write(&source, flac_bytes(44_100, 16, 2, FULL_TAGS)).unwrap();
        fs::write(&dest, flac_bytes(44_100, 16, 2, &[])).unwrap();

        let tagger = LoftyTagger::new();
        assert_eq!(tagger.check_tags(&dest).unwrap(), TagCheck::failed("no tags found"));

        tagger.copy_tags(&source, &dest).unwrap();
        assert_eq!(tagger.check_tags(&dest).unwrap(), TagCheck::ok());

        let copied = tagger.release_tags(&dest).unwrap();
        assert_eq!(copied.artist.as_deref(), Some("Boards of Canada"));
        assert_eq!(copied.album.as_deref(), Some("Geogaddi"));
        assert_eq!(copied.year, Some(2002));

        // Stream info survives the rewrite
        let asset = LoftyInspector::new().inspect(&dest).unwrap();
        assert_eq!((asset.sample_rate, asset.bit_depth, asset.channel_count), (44_100, 16, 2));
    }

    #[test]
    fn test_check_tags_names_missing_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.flac");
        fs::write(&path, flac_bytes(44_100, 16, 2, &["ARTIST=A", "ALBUM=B", "TITLE=C"])).unwrap();

        let check = LoftyTagger::new().check_tags(&path).unwrap();
        assert_eq!(check, TagCheck::failed("missing track number"));
    }

    #[test]
    fn test_release_tags_of_untagged_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.flac");
        fs::write(&path, flac_bytes(44_100, 16, 2, &[])).unwrap();

        assert_eq!(LoftyTagger::new().release_tags(&path).unwrap(), ReleaseTags::default());
    }

    #[test]
    fn test_tag_check_constructors() {
        assert!(TagCheck::ok().ok);
        let failed = TagCheck::failed("missing album");
        assert!(!failed.ok);
        assert_eq!(failed.message, "missing album");
    }
}
