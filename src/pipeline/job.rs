//! Single-file transcode
//!
//! Inspect, plan, execute, classify, then tag. A failed job leaves no output
//! file behind.

use super::executor::{classify, PipelineExecutor, PipelineFailure};
use super::planner;
use crate::config::Toolchain;
use crate::discovery::output_file_path;
use crate::error::{FlacpipeError, Result};
use crate::metadata::{AssetInspector, TagHandler};
use crate::types::{JobOutcome, PipelineSpec, SourceAsset, TranscodeJob};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs transcode jobs with shared collaborators
#[derive(Clone)]
pub struct TranscodeJobRunner {
    inspector: Arc<dyn AssetInspector>,
    tagger: Arc<dyn TagHandler>,
    executor: PipelineExecutor,
    toolchain: Toolchain,
}

impl TranscodeJobRunner {
    pub fn new(
        inspector: Arc<dyn AssetInspector>,
        tagger: Arc<dyn TagHandler>,
        executor: PipelineExecutor,
        toolchain: Toolchain,
    ) -> Self {
        Self {
            inspector,
            tagger,
            executor,
            toolchain,
        }
    }

    /// Inspect and plan without running anything
    pub fn prepare(&self, job: &TranscodeJob) -> Result<(SourceAsset, PathBuf, PipelineSpec)> {
        let asset = self.inspector.inspect(&job.source)?;
        let output_path = output_file_path(&job.output_dir, &job.source, job.profile);
        let spec = planner::plan(&asset, job.profile, &output_path, &self.toolchain)?;
        Ok((asset, output_path, spec))
    }

    /// Transcode one file, returning the path of the tagged output
    pub fn run(&self, job: &mut TranscodeJob) -> Result<PathBuf> {
        job.outcome = JobOutcome::Running;
        match self.run_inner(job) {
            Ok(path) => {
                job.outcome = JobOutcome::Succeeded;
                Ok(path)
            }
            Err(e) => {
                job.outcome = JobOutcome::Failed;
                if let Some(path) = &job.output_path {
                    remove_partial(path);
                }
                Err(e)
            }
        }
    }

    fn run_inner(&self, job: &mut TranscodeJob) -> Result<PathBuf> {
        debug!("Transcoding: {}", job.source.display());

        let (asset, output_path, spec) = self.prepare(job)?;
        job.asset = Some(asset);

        ensure_dir(&job.output_dir)?;
        job.output_path = Some(output_path.clone());

        debug!("Pipeline for {}: {}", job.source.display(), spec);
        let results = self.executor.execute(&spec);
        job.pipeline = Some(spec);

        if let Err(failure) = classify(&results) {
            return Err(self.stage_error(job, failure));
        }

        self.tagger.copy_tags(&job.source, &output_path)?;
        let check = self.tagger.check_tags(&output_path)?;
        if !check.ok {
            return Err(FlacpipeError::TagValidation {
                path: output_path,
                message: check.message,
            });
        }

        Ok(output_path)
    }

    fn stage_error(&self, job: &TranscodeJob, failure: PipelineFailure) -> FlacpipeError {
        let command = job
            .pipeline
            .as_ref()
            .and_then(|spec| spec.stages.get(failure.stage()))
            .map(|stage| stage.to_string())
            .unwrap_or_default();
        let path = job.source.clone();

        match failure {
            PipelineFailure::Definitive { stage, result } => FlacpipeError::StageExecution {
                path,
                stage,
                command,
                exit: result.exit,
                stderr: result.stderr,
            },
            PipelineFailure::BrokenPipe { stage, result } => FlacpipeError::PipeBackpressure {
                path,
                stage,
                command,
                stderr: result.stderr,
            },
        }
    }
}

/// Create a directory tree, tolerating a sibling worker creating it first
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(FlacpipeError::output_error(dir, e)),
    }
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
