//! CLI argument parsing and configuration

use crate::types::OutputProfile;
use clap::Parser;
use std::path::PathBuf;

/// flacpipe - Parallel FLAC transcoding
///
/// Transcodes a directory of FLAC files into MP3 or 16 bit FLAC by chaining
/// flac, sox and lame. A failure in any file removes the whole output
/// directory, so either a complete transcode exists or nothing does.
#[derive(Parser, Debug)]
#[command(name = "flacpipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Source directory containing FLAC files
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Directory in which output directories are created (defaults to the source's parent)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Output format (can be repeated: -f 320 -f v0)
    #[arg(short, long = "format", value_enum, value_name = "FORMAT")]
    pub formats: Vec<OutputProfile>,

    /// Base name for output directories (defaults to "Artist - Album - (Year)" from the tags)
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    /// Number of concurrent transcodes (defaults to CPU count)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Path to the flac binary
    #[arg(long, value_name = "PATH", default_value = "flac")]
    pub flac: String,

    /// Path to the lame binary
    #[arg(long, value_name = "PATH", default_value = "lame")]
    pub lame: String,

    /// Path to the sox binary
    #[arg(long, value_name = "PATH", default_value = "sox")]
    pub sox: String,

    /// Give up on a batch after this many hours
    #[arg(long, value_name = "HOURS", default_value = "12")]
    pub timeout_hours: u64,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress progress bars)
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    /// Dry run - show the commands that would run without transcoding
    #[arg(long, default_value = "false")]
    pub dry_run: bool,
}

impl Cli {
    /// Formats to produce, defaulting to 320 and V0
    pub fn profiles(&self) -> Vec<OutputProfile> {
        if self.formats.is_empty() {
            return vec![OutputProfile::Mp3Cbr320, OutputProfile::Mp3V0];
        }
        let mut profiles = Vec::with_capacity(self.formats.len());
        for profile in &self.formats {
            if !profiles.contains(profile) {
                profiles.push(*profile);
            }
        }
        profiles
    }

    /// Get the log level based on verbosity flags
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles() {
        let cli = Cli::parse_from(["flacpipe", "/music/album"]);
        assert_eq!(
            cli.profiles(),
            vec![OutputProfile::Mp3Cbr320, OutputProfile::Mp3V0]
        );
        assert_eq!(cli.timeout_hours, 12);
        assert_eq!(cli.log_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_repeated_formats_deduplicated() {
        let cli = Cli::parse_from(["flacpipe", "-f", "flac", "-f", "v2", "-f", "flac", "/music/album"]);
        assert_eq!(cli.profiles(), vec![OutputProfile::Flac16, OutputProfile::Mp3V2]);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["flacpipe", "-f", "aac", "/music/album"]).is_err());
    }
}
