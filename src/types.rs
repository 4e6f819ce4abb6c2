//! Core data types for flacpipe
//!
//! These types describe what is transcoded and how, and flow from the
//! coordinator down to the executor and back.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

// =============================================================================
// Source assets
// =============================================================================

/// Stream properties of a lossless source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAsset {
    pub path: PathBuf,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bit_depth: u8,
    pub channel_count: u8,
}

impl SourceAsset {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, bit_depth: u8, channel_count: u8) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            bit_depth,
            channel_count,
        }
    }

    /// Derive the resampling needed to bring this asset to CD-compatible form
    pub fn resample_plan(&self) -> ResamplePlan {
        ResamplePlan::for_asset(self)
    }
}

/// Whether (and to which rate) a source must be resampled before encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplePlan {
    pub required: bool,
    /// `None` when the source rate is not a multiple of 44.1k or 48k
    pub target_rate: Option<u32>,
}

/// Highest sample rate passed through without resampling
pub const MAX_NATIVE_SAMPLE_RATE: u32 = 48_000;

/// Highest bit depth passed through without resampling
pub const MAX_NATIVE_BIT_DEPTH: u8 = 16;

impl ResamplePlan {
    pub fn for_asset(asset: &SourceAsset) -> Self {
        let required =
            asset.bit_depth > MAX_NATIVE_BIT_DEPTH || asset.sample_rate > MAX_NATIVE_SAMPLE_RATE;

        let target_rate = if asset.sample_rate == 0 {
            None
        } else if asset.sample_rate % 44_100 == 0 {
            Some(44_100)
        } else if asset.sample_rate % 48_000 == 0 {
            Some(48_000)
        } else {
            None
        };

        Self {
            required,
            target_rate,
        }
    }
}

// =============================================================================
// Output profiles
// =============================================================================

/// Encoder program family used by a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderFamily {
    Lame,
    Flac,
}

/// Target format and quality of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum OutputProfile {
    /// Lossless FLAC, 16 bit
    #[value(name = "flac")]
    Flac16,
    /// MP3 at constant 320 kbps
    #[value(name = "320")]
    Mp3Cbr320,
    /// MP3 VBR, highest quality
    #[value(name = "v0")]
    Mp3V0,
    /// MP3 VBR, medium quality
    #[value(name = "v2")]
    Mp3V2,
}

impl OutputProfile {
    pub const ALL: [OutputProfile; 4] = [
        OutputProfile::Flac16,
        OutputProfile::Mp3Cbr320,
        OutputProfile::Mp3V0,
        OutputProfile::Mp3V2,
    ];

    pub fn encoder(self) -> EncoderFamily {
        match self {
            OutputProfile::Flac16 => EncoderFamily::Flac,
            OutputProfile::Mp3Cbr320 | OutputProfile::Mp3V0 | OutputProfile::Mp3V2 => {
                EncoderFamily::Lame
            }
        }
    }

    /// File extension including the leading dot
    pub fn extension(self) -> &'static str {
        match self.encoder() {
            EncoderFamily::Flac => ".flac",
            EncoderFamily::Lame => ".mp3",
        }
    }

    /// Encoder option string substituted for `{OPTS}`
    pub fn encoder_options(self) -> &'static str {
        match self {
            OutputProfile::Flac16 => "--best",
            OutputProfile::Mp3Cbr320 => "-h -b 320 --ignore-tag-errors",
            OutputProfile::Mp3V0 => "-V 0 --vbr-new --ignore-tag-errors",
            OutputProfile::Mp3V2 => "-V 2 --vbr-new --ignore-tag-errors",
        }
    }

    /// Label appended to the output directory name
    pub fn label(self) -> &'static str {
        match self {
            OutputProfile::Flac16 => "FLAC - Lossless",
            OutputProfile::Mp3Cbr320 => "MP3 - 320",
            OutputProfile::Mp3V0 => "MP3 - V0",
            OutputProfile::Mp3V2 => "MP3 - V2",
        }
    }

    pub fn is_lossless(self) -> bool {
        self.encoder() == EncoderFamily::Flac
    }
}

impl fmt::Display for OutputProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputProfile::Flac16 => "FLAC",
            OutputProfile::Mp3Cbr320 => "320",
            OutputProfile::Mp3V0 => "V0",
            OutputProfile::Mp3V2 => "V2",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Pipelines
// =============================================================================

/// One external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: String,
    pub arguments: Vec<String>,
}

impl StageCommand {
    pub fn new<I, S>(program: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for StageCommand {
    /// Shell-escaped rendering, suitable for logs and copy-paste
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.arguments.iter().map(String::as_str));
        f.write_str(&shell_words::join(words))
    }
}

/// Ordered stages for one file, stdout of each feeding the next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub stages: Vec<StageCommand>,
}

impl PipelineSpec {
    pub fn new(stages: Vec<StageCommand>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}

/// How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExit {
    /// Normal exit with a code
    Code(i32),
    /// Killed by a signal
    Signal(i32),
    /// Never started (spawn failed)
    NotStarted,
}

impl StageExit {
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        match (status.code(), status.signal()) {
            (Some(code), _) => StageExit::Code(code),
            (None, Some(signal)) => StageExit::Signal(signal),
            (None, None) => StageExit::NotStarted,
        }
    }

    pub fn success(self) -> bool {
        self == StageExit::Code(0)
    }

    /// Terminated by SIGPIPE because a downstream stage went away
    pub fn is_broken_pipe(self) -> bool {
        self == StageExit::Signal(libc::SIGPIPE)
    }
}

impl fmt::Display for StageExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageExit::Code(code) => write!(f, "exit code {}", code),
            StageExit::Signal(libc::SIGPIPE) => f.write_str("SIGPIPE"),
            StageExit::Signal(signal) => write!(f, "signal {}", signal),
            StageExit::NotStarted => f.write_str("not started"),
        }
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub exit: StageExit,
    /// Everything the stage wrote to stderr (lossy UTF-8)
    pub stderr: String,
}

impl StageResult {
    pub fn new(exit: StageExit, stderr: impl Into<String>) -> Self {
        Self {
            exit,
            stderr: stderr.into(),
        }
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Lifecycle of a transcode job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One source file to transcode into a given profile
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub source: PathBuf,
    pub profile: OutputProfile,
    /// Directory the output file is written into
    pub output_dir: PathBuf,
    /// Filled in once planned
    pub asset: Option<SourceAsset>,
    pub output_path: Option<PathBuf>,
    pub pipeline: Option<PipelineSpec>,
    pub outcome: JobOutcome,
}

impl TranscodeJob {
    pub fn new(source: impl Into<PathBuf>, profile: OutputProfile, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            profile,
            output_dir: output_dir.into(),
            asset: None,
            output_path: None,
            pipeline: None,
            outcome: JobOutcome::Pending,
        }
    }
}
