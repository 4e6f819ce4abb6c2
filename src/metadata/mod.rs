//! Source inspection and tag handling
//!
//! Traits for the collaborators the pipeline depends on, with lofty-backed
//! implementations, and release naming from tags.

pub mod lofty_backend;
pub mod release;
pub mod traits;

pub use lofty_backend::{LoftyInspector, LoftyTagger};
pub use release::{release_name, ReleaseTags};
pub use traits::{AssetInspector, TagCheck, TagHandler};
