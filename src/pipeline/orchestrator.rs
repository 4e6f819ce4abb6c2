//! Batch orchestration
//!
//! Transcodes a whole source tree into one freshly created output directory.
//! Jobs run on a dedicated rayon pool; the first failure cancels every running
//! pipeline, waits for the pool to drain, and deletes the output directory.
//!
//! The rollback deletes the entire output directory. That is only safe because
//! the directory is created by the batch itself and never adopted: an existing
//! directory means "already done" and is returned untouched.

use super::executor::PipelineExecutor;
use super::job::{ensure_dir, TranscodeJobRunner};
use super::supervisor::{CancelHandle, ProcessSupervisor};
use crate::config::Toolchain;
use crate::discovery::{self, batch_output_dir, mirror_dir};
use crate::error::{FlacpipeError, Result};
use crate::metadata::{release_name, AssetInspector, LoftyInspector, LoftyTagger, ReleaseTags, TagHandler};
use crate::types::{OutputProfile, TranscodeJob};
use crossbeam_channel::{bounded, RecvTimeoutError};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long to wait for workers to exit after a timeout has killed their pipelines
const DRAIN_GRACE: Duration = Duration::from_secs(60);

/// What a batch produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every source was transcoded into `dir`
    Transcoded { dir: PathBuf, files: usize },
    /// `dir` existed before the run; nothing was done
    AlreadyExists { dir: PathBuf },
    /// Lossless output with nothing to resample: the source is the output
    PassThrough { dir: PathBuf },
}

impl BatchOutcome {
    /// The directory holding the batch's output
    pub fn path(&self) -> &Path {
        match self {
            BatchOutcome::Transcoded { dir, .. }
            | BatchOutcome::AlreadyExists { dir }
            | BatchOutcome::PassThrough { dir } => dir,
        }
    }
}

/// Runs batches of transcode jobs
#[derive(Clone)]
pub struct BatchCoordinator {
    inspector: Arc<dyn AssetInspector>,
    tagger: Arc<dyn TagHandler>,
    toolchain: Toolchain,
    name: Option<String>,
    timeout: Duration,
    show_progress: bool,
    cancel: CancelHandle,
}

impl BatchCoordinator {
    pub fn new(inspector: Arc<dyn AssetInspector>, tagger: Arc<dyn TagHandler>) -> Self {
        Self {
            inspector,
            tagger,
            toolchain: Toolchain::default(),
            name: None,
            timeout: crate::config::settings::DEFAULT_BATCH_TIMEOUT,
            show_progress: false,
            cancel: CancelHandle::new(),
        }
    }

    /// Coordinator using the lofty inspector and tagger
    pub fn with_lofty() -> Self {
        Self::new(Arc::new(LoftyInspector::new()), Arc::new(LoftyTagger::new()))
    }

    pub fn toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Base name of output directories (defaults to a name built from tags)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Handle that cancels the running batch from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Name used for output directories: the configured name, or one built
    /// from the artist, album and year tags of `sources`
    pub fn output_name(&self, sources: &[PathBuf]) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let tags: Vec<ReleaseTags> = sources
            .iter()
            .map(|source| {
                self.tagger.release_tags(source).unwrap_or_else(|e| {
                    warn!("Cannot read tags of {}: {}", source.display(), e);
                    ReleaseTags::default()
                })
            })
            .collect();
        release_name(&tags)
    }

    /// Job runner sharing this coordinator's collaborators
    pub fn runner(&self, executor: PipelineExecutor) -> TranscodeJobRunner {
        TranscodeJobRunner::new(
            Arc::clone(&self.inspector),
            Arc::clone(&self.tagger),
            executor,
            self.toolchain.clone(),
        )
    }

    /// Transcode every FLAC under `source_root` into a new directory under
    /// `output_root`, with at most `concurrency_limit` jobs at once.
    pub fn run_batch(
        &self,
        source_root: &Path,
        output_root: &Path,
        profile: OutputProfile,
        concurrency_limit: usize,
    ) -> Result<BatchOutcome> {
        let batch_start = Instant::now();

        if self.cancel.is_cancelled() {
            return Err(FlacpipeError::Cancelled);
        }
        self.toolchain.validate()?;

        let sources = discovery::scan(source_root)?;
        debug!(
            "Using {} inspector and {} tagger",
            self.inspector.name(),
            self.tagger.name()
        );

        if profile.is_lossless() && !self.any_needs_resampling(&sources)? {
            let expected_root = source_root.parent().unwrap_or(source_root);
            if output_root != expected_root {
                warn!(
                    "No encode necessary for {}; files won't be placed in {}",
                    profile,
                    output_root.display()
                );
            }
            info!("Nothing to resample, {} is already {}", source_root.display(), profile.label());
            return Ok(BatchOutcome::PassThrough {
                dir: source_root.to_path_buf(),
            });
        }

        let output_dir = batch_output_dir(output_root, &self.output_name(&sources), profile);
        ensure_dir(output_root)?;
        match fs::create_dir(&output_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                info!(
                    "{} already exists, treating {} as done",
                    output_dir.display(),
                    profile
                );
                return Ok(BatchOutcome::AlreadyExists { dir: output_dir });
            }
            Err(e) => return Err(FlacpipeError::output_error(&output_dir, e)),
        }

        info!(
            "Transcoding {} files to {} in {}",
            sources.len(),
            profile,
            output_dir.display()
        );

        let jobs: Vec<TranscodeJob> = sources
            .iter()
            .map(|source| TranscodeJob::new(source, profile, mirror_dir(source_root, &output_dir, source)))
            .collect();

        let result = self
            .run_jobs(jobs, concurrency_limit)
            .and_then(|files| copy_ancillary(source_root, &output_dir).map(|_| files));

        match result {
            Ok(files) => {
                info!(
                    "Batch {} completed in {:.2}s",
                    profile,
                    batch_start.elapsed().as_secs_f64()
                );
                Ok(BatchOutcome::Transcoded {
                    dir: output_dir,
                    files,
                })
            }
            Err(e) => {
                rollback(&output_dir);
                Err(e)
            }
        }
    }

    fn any_needs_resampling(&self, sources: &[PathBuf]) -> Result<bool> {
        for source in sources {
            let asset = self
                .inspector
                .inspect(source)
                .map_err(|e| FlacpipeError::BatchTranscode {
                    path: source.clone(),
                    source: Box::new(e),
                })?;
            if asset.resample_plan().required {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run all jobs on a bounded pool; returns the number transcoded
    fn run_jobs(&self, jobs: Vec<TranscodeJob>, concurrency_limit: usize) -> Result<usize> {
        let supervisor = Arc::new(ProcessSupervisor::new());
        let _attached = self.cancel.attach(&supervisor);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency_limit.max(1))
            .thread_name(|i| format!("flacpipe-worker-{}", i))
            .build()
            .map_err(|e| FlacpipeError::ConfigError(format!("Failed to build worker pool: {}", e)))?;
        debug!("Worker pool with {} threads", pool.current_num_threads());

        let progress_bar = self.progress_bar(jobs.len());
        let runner = self.runner(PipelineExecutor::new(Arc::clone(&supervisor)));
        let first_failure: Arc<Mutex<Option<FlacpipeError>>> = Arc::new(Mutex::new(None));
        let completed = Arc::new(AtomicUsize::new(0));

        let (done_tx, done_rx) = bounded::<()>(1);
        {
            let supervisor = Arc::clone(&supervisor);
            let first_failure = Arc::clone(&first_failure);
            let completed = Arc::clone(&completed);
            let progress_bar = progress_bar.clone();

            pool.spawn(move || {
                jobs.into_par_iter().for_each(|mut job| {
                    if supervisor.is_cancelled() {
                        return;
                    }
                    let result = panic::catch_unwind(AssertUnwindSafe(|| runner.run(&mut job)))
                        .unwrap_or_else(|payload| {
                            Err(FlacpipeError::JobPanicked {
                                path: job.source.clone(),
                                message: panic_message(payload.as_ref()),
                            })
                        });
                    match result {
                        Ok(output) => {
                            debug!("Wrote {}", output.display());
                            completed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            let mut slot = first_failure.lock().unwrap_or_else(|p| p.into_inner());
                            if slot.is_none() && !supervisor.is_cancelled() {
                                error!("Failed {}: {}", job.source.display(), e);
                                *slot = Some(FlacpipeError::BatchTranscode {
                                    path: job.source.clone(),
                                    source: Box::new(e),
                                });
                                drop(slot);
                                supervisor.cancel();
                            } else {
                                debug!("Discarding follow-on failure for {}: {}", job.source.display(), e);
                            }
                        }
                    }
                    progress_bar.inc(1);
                    progress_bar.set_message(
                        job.source
                            .file_name()
                            .unwrap_or_default()
                            .to_string_lossy()
                            .into_owned(),
                    );
                });
                // The receiver may have given up after a timeout
                let _ = done_tx.send(());
            });
        }

        match done_rx.recv_timeout(self.timeout) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                error!("Batch exceeded {:?}, terminating all pipelines", self.timeout);
                supervisor.cancel();
                if done_rx.recv_timeout(DRAIN_GRACE).is_err() {
                    warn!("Workers did not exit within {:?} after termination", DRAIN_GRACE);
                }
                progress_bar.abandon();
                return Err(FlacpipeError::Timeout {
                    limit: self.timeout,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(FlacpipeError::ConfigError("Worker pool exited unexpectedly".to_string()));
            }
        }

        if let Some(failure) = first_failure.lock().unwrap_or_else(|p| p.into_inner()).take() {
            progress_bar.abandon_with_message("Transcode failed");
            return Err(failure);
        }
        if self.cancel.is_cancelled() {
            progress_bar.abandon_with_message("Cancelled");
            return Err(FlacpipeError::Cancelled);
        }

        progress_bar.finish_with_message("Transcode complete");
        Ok(completed.load(Ordering::Relaxed))
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb
    }
}

/// Copy allow-listed non-audio files into the mirrored output tree
fn copy_ancillary(source_root: &Path, output_dir: &Path) -> Result<usize> {
    let files = discovery::ancillary_files(source_root)?;
    for file in &files {
        let target_dir = mirror_dir(source_root, output_dir, file);
        ensure_dir(&target_dir)?;
        let Some(name) = file.file_name() else {
            continue;
        };
        let target = target_dir.join(name);
        fs::copy(file, &target).map_err(|e| FlacpipeError::output_error(&target, e))?;
        debug!("Copied {}", target.display());
    }
    if !files.is_empty() {
        info!("Copied {} ancillary files", files.len());
    }
    Ok(files.len())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Delete a batch's output directory after a failure
fn rollback(output_dir: &Path) {
    warn!("Removing incomplete output {}", output_dir.display());
    if let Err(e) = fs::remove_dir_all(output_dir) {
        error!("Failed to remove {}: {}", output_dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_outcome_path() {
        let outcome = BatchOutcome::Transcoded {
            dir: PathBuf::from("/out/Album [MP3 - V0]"),
            files: 3,
        };
        assert_eq!(outcome.path(), Path::new("/out/Album [MP3 - V0]"));
        assert_eq!(
            BatchOutcome::PassThrough { dir: PathBuf::from("/music/Album") }.path(),
            Path::new("/music/Album")
        );
    }

    #[test]
    fn test_output_name_prefers_configured_name() {
        let named = BatchCoordinator::with_lofty().name("Custom");
        assert_eq!(named.output_name(&[PathBuf::from("/nonexistent/01.flac")]), "Custom");
    }

    #[test]
    fn test_output_name_falls_back_when_tags_unreadable() {
        let coordinator = BatchCoordinator::with_lofty();
        assert_eq!(
            coordinator.output_name(&[PathBuf::from("/nonexistent/01.flac")]),
            "Unknown Artist - Unknown Album - (0000)"
        );
    }

    #[test]
    fn test_copy_ancillary_mirrors_tree() {
        let src = tempfile::TempDir::new().unwrap();
        let out = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("Scans")).unwrap();
        fs::write(src.path().join("rip.log"), b"log").unwrap();
        fs::write(src.path().join("Scans/front.jpg"), b"jpg").unwrap();
        fs::write(src.path().join("01.flac"), b"flac").unwrap();

        assert_eq!(copy_ancillary(src.path(), out.path()).unwrap(), 2);
        assert!(out.path().join("rip.log").is_file());
        assert!(out.path().join("Scans/front.jpg").is_file());
        assert!(!out.path().join("01.flac").exists());
    }
}
