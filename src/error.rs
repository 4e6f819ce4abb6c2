//! Unified error types for flacpipe
//!
//! Error strategy:
//! - Job errors (inspection, planning, stage failure, tag check, panics): fatal for the
//!   job, and one failed job cancels and rolls back the whole batch
//! - Batch errors (output directory, timeout, cancellation): fatal
//!
//! Only `AlreadyExists` while creating parent directories is ever ignored.

use crate::types::StageExit;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for flacpipe operations
#[derive(Debug, Error)]
pub enum FlacpipeError {
    // =========================================================================
    // Job errors - abort the job, cancel the batch
    // =========================================================================
    #[error("Cannot read audio properties of '{path}': {reason}\n  Tip: The file may be corrupt or not a FLAC file")]
    UnreadableAsset { path: PathBuf, reason: String },

    #[error("FLAC file '{path}' has a sample rate of {sample_rate} Hz, which is not a multiple of 44.1 or 48 kHz but needs resampling; this is unsupported")]
    UnsupportedRate { path: PathBuf, sample_rate: u32 },

    #[error("FLAC file '{path}' has {channels} channels; downmixing more than 2 channels is unsupported")]
    UnsupportedChannelLayout { path: PathBuf, channels: u8 },

    #[error("Transcode of '{path}' failed at stage {stage} (`{command}`, {exit}): {stderr}")]
    StageExecution {
        path: PathBuf,
        stage: usize,
        command: String,
        exit: StageExit,
        stderr: String,
    },

    #[error("Transcode of '{path}' failed: stage {stage} (`{command}`) was killed by SIGPIPE and no other stage reported an error")]
    PipeBackpressure {
        path: PathBuf,
        stage: usize,
        command: String,
        stderr: String,
    },

    #[error("Tag check failed on transcoded file '{path}': {message}")]
    TagValidation { path: PathBuf, message: String },

    #[error("Transcode of '{path}' panicked: {message}")]
    JobPanicked { path: PathBuf, message: String },

    // =========================================================================
    // Batch errors
    // =========================================================================
    #[error("Batch transcode failed on '{path}': {source}")]
    BatchTranscode {
        path: PathBuf,
        #[source]
        source: Box<FlacpipeError>,
    },

    #[error("Batch did not finish within {limit:?}; all pipelines were terminated")]
    Timeout { limit: Duration },

    #[error("Batch was cancelled")]
    Cancelled,

    #[error("File not found: '{0}'\n  Tip: Check the path exists and is accessible")]
    FileNotFound(PathBuf),

    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    OutputError { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Result type alias for flacpipe operations
pub type Result<T> = std::result::Result<T, FlacpipeError>;

impl FlacpipeError {
    /// Captured stderr of the stage that caused this error, if any
    pub fn stage_stderr(&self) -> Option<&str> {
        match self {
            FlacpipeError::StageExecution { stderr, .. }
            | FlacpipeError::PipeBackpressure { stderr, .. } => Some(stderr),
            FlacpipeError::BatchTranscode { source, .. } => source.stage_stderr(),
            _ => None,
        }
    }

    /// Create an unreadable-asset error
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        FlacpipeError::UnreadableAsset {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an output error, checking for common issues
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied. Check that you have write access to {}", path.display())
            }
            std::io::ErrorKind::NotFound => {
                format!("Directory does not exist: {}", path.parent().map(|p| p.display().to_string()).unwrap_or_default())
            }
            _ => err.to_string(),
        };
        FlacpipeError::OutputError { path, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_keeps_sub_hour_limits() {
        let err = FlacpipeError::Timeout {
            limit: Duration::from_secs(90),
        };
        assert!(err.to_string().contains("90s"), "{}", err);
    }

    #[test]
    fn test_stage_stderr_through_batch_error() {
        let inner = FlacpipeError::StageExecution {
            path: "/a.flac".into(),
            stage: 0,
            command: "flac -dcs -- /a.flac".into(),
            exit: StageExit::Code(1),
            stderr: "ERROR: bad sync".into(),
        };
        let batch = FlacpipeError::BatchTranscode {
            path: "/a.flac".into(),
            source: Box::new(inner),
        };
        assert_eq!(batch.stage_stderr(), Some("ERROR: bad sync"));
        assert!(batch.to_string().contains("ERROR: bad sync"));
        assert!(batch.to_string().contains("/a.flac"));
    }

    #[test]
    fn test_output_error_permission_hint() {
        let err = FlacpipeError::output_error(
            "/out/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("Permission denied"));
    }
}
