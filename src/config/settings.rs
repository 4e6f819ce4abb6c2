//! Runtime configuration settings

use super::toolchain::Toolchain;
use crate::types::OutputProfile;
use std::path::PathBuf;
use std::time::Duration;

/// Default time a whole batch may take before it is torn down
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Runtime settings for a transcode run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Source directory
    pub source: PathBuf,
    /// Parent of the output directories
    pub output_root: PathBuf,
    /// Base name for output directories; `None` derives it from the source tags
    pub name: Option<String>,
    /// Formats to produce, one batch each
    pub profiles: Vec<OutputProfile>,
    /// Number of concurrent transcodes
    pub concurrency_limit: usize,
    /// External program templates
    pub toolchain: Toolchain,
    /// Upper bound on a single batch
    pub batch_timeout: Duration,
    /// Show progress bars
    pub show_progress: bool,
    /// Dry run mode - show commands without running them
    pub dry_run: bool,
}

impl Settings {
    /// Create settings from CLI arguments
    pub fn from_cli(cli: &super::cli::Cli) -> Self {
        let source = std::path::absolute(&cli.source).unwrap_or_else(|_| cli.source.clone());

        let output_root = cli.output.clone().unwrap_or_else(|| {
            source
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        });

        Self {
            source,
            output_root,
            name: cli.name.clone(),
            profiles: cli.profiles(),
            concurrency_limit: cli.threads.unwrap_or_else(num_cpus::get).max(1),
            toolchain: Toolchain::new(&cli.flac, &cli.lame, &cli.sox),
            batch_timeout: Duration::from_secs(cli.timeout_hours.saturating_mul(60 * 60)),
            show_progress: !cli.quiet,
            dry_run: cli.dry_run,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: PathBuf::from("."),
            output_root: PathBuf::from(".."),
            name: None,
            profiles: vec![OutputProfile::Mp3Cbr320, OutputProfile::Mp3V0],
            concurrency_limit: num_cpus::get().max(1),
            toolchain: Toolchain::default(),
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            show_progress: true,
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use clap::Parser;

    #[test]
    fn test_from_cli_defaults() {
        let cli = Cli::parse_from(["flacpipe", "/music/Artist - Album (2001)"]);
        let settings = Settings::from_cli(&cli);
        assert_eq!(settings.name, None);
        assert_eq!(settings.output_root, PathBuf::from("/music"));
        assert!(settings.concurrency_limit >= 1);
        assert_eq!(settings.batch_timeout, DEFAULT_BATCH_TIMEOUT);
        assert_eq!(settings.toolchain, Toolchain::default());
    }

    #[test]
    fn test_from_cli_overrides() {
        let cli = Cli::parse_from([
            "flacpipe", "-o", "/out", "-n", "Custom", "-j", "0", "-q", "--lame", "/opt/lame",
            "/music/album",
        ]);
        let settings = Settings::from_cli(&cli);
        assert_eq!(settings.output_root, PathBuf::from("/out"));
        assert_eq!(settings.name.as_deref(), Some("Custom"));
        assert_eq!(settings.concurrency_limit, 1);
        assert!(!settings.show_progress);
        assert!(settings.toolchain.lame_encoder.starts_with("/opt/lame "));
    }
}
