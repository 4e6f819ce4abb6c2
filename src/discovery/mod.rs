//! File discovery and output layout

pub mod layout;
pub mod scanner;

pub use layout::{batch_output_dir, exceeds_path_limit, mirror_dir, output_file_path, sanitize_basename};
pub use scanner::{ancillary_files, scan, ANCILLARY_EXTENSIONS, SOURCE_EXTENSION};
