//! flacpipe - Parallel FLAC transcoding through supervised external pipelines
//!
//! Converts a directory of FLAC files into MP3 or 16 bit FLAC by chaining
//! `flac`, `sox` and `lame`, many files at once, with all-or-nothing output:
//! if any file fails, every running encoder is killed and the output
//! directory is removed.
//!
//! # Architecture
//!
//! - `config`: CLI argument parsing, runtime settings and command templates
//! - `discovery`: source scanning and output tree layout
//! - `metadata`: source inspection and tag copying (swappable backends)
//! - `pipeline`: stage planning, pipeline execution, batch orchestration
//!
//! # Example
//!
//! ```no_run
//! use flacpipe::pipeline::BatchCoordinator;
//! use flacpipe::types::OutputProfile;
//! use std::path::Path;
//!
//! let coordinator = BatchCoordinator::with_lofty();
//! let outcome = coordinator
//!     .run_batch(Path::new("/music/Album"), Path::new("/music"), OutputProfile::Mp3V0, 4)
//!     .expect("Transcode failed");
//! println!("Output in {}", outcome.path().display());
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod types;

// Re-export key types at crate root
pub use error::{FlacpipeError, Result};
pub use types::{OutputProfile, PipelineSpec, SourceAsset, StageCommand, StageResult};
