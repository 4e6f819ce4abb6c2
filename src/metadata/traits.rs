//! Collaborator trait abstractions
//!
//! The pipeline only needs stream properties of sources and a way to carry
//! tags over to outputs. Both sit behind traits so tests and alternative
//! backends can swap them without touching pipeline code.

use super::release::ReleaseTags;
use crate::error::Result;
use crate::types::SourceAsset;
use std::path::Path;

/// Reads stream properties of a source file
pub trait AssetInspector: Send + Sync {
    /// Inspect a source, failing with `UnreadableAsset` on corrupt input
    fn inspect(&self, path: &Path) -> Result<SourceAsset>;

    /// Get the name of this inspector (for logging)
    fn name(&self) -> &'static str;
}

/// Result of validating the tags of a transcoded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCheck {
    pub ok: bool,
    pub message: String,
}

impl TagCheck {
    pub fn ok() -> Self {
        Self {
            ok: true,
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Copies and validates tags
pub trait TagHandler: Send + Sync {
    /// Copy tags from `source` onto `dest`
    fn copy_tags(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Validate the tags of a finished output file
    fn check_tags(&self, path: &Path) -> Result<TagCheck>;

    /// Artist, album and year of a source, for naming the output
    fn release_tags(&self, path: &Path) -> Result<ReleaseTags>;

    /// Get the name of this tag handler (for logging)
    fn name(&self) -> &'static str;
}
