//! Transcode pipeline
//!
//! - `planner`: source properties + profile -> stage commands
//! - `executor`: runs a stage chain and classifies its failure
//! - `job`: one file, end to end
//! - `orchestrator`: a whole tree on a worker pool, with rollback
//! - `supervisor`: process-group registry used for cancellation

pub mod executor;
pub mod job;
pub mod orchestrator;
pub mod planner;
pub mod supervisor;

pub use executor::{classify, PipelineExecutor, PipelineFailure};
pub use job::TranscodeJobRunner;
pub use orchestrator::{BatchCoordinator, BatchOutcome};
pub use planner::plan;
pub use supervisor::{CancelHandle, ProcessSupervisor};

use crate::config::Settings;
use crate::discovery::{self, exceeds_path_limit, layout::profile_dir_name, mirror_dir};
use crate::error::{FlacpipeError, Result};
use crate::types::TranscodeJob;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Outcome of every batch in a run, in profile order
#[derive(Debug)]
pub struct PipelineResult {
    pub batches: Vec<BatchOutcome>,
}

/// Run one batch per configured profile with the lofty collaborators
pub fn run(settings: &Settings) -> Result<PipelineResult> {
    let coordinator = coordinator_for(settings, BatchCoordinator::with_lofty());
    run_with(settings, &coordinator)
}

/// Apply settings to a coordinator
pub fn coordinator_for(settings: &Settings, coordinator: BatchCoordinator) -> BatchCoordinator {
    let coordinator = coordinator
        .toolchain(settings.toolchain.clone())
        .timeout(settings.batch_timeout)
        .show_progress(settings.show_progress);
    match &settings.name {
        Some(name) => coordinator.name(name.clone()),
        None => coordinator,
    }
}

/// Run one batch per configured profile, stopping at the first failed batch
pub fn run_with(settings: &Settings, coordinator: &BatchCoordinator) -> Result<PipelineResult> {
    let run_start = Instant::now();

    // Resolve the name once so every profile shares it
    let sources = discovery::scan(&settings.source)?;
    let name = coordinator.output_name(&sources);
    info!("Output name: {}", name);
    let coordinator = coordinator.clone().name(name.clone());

    for profile in &settings.profiles {
        let dir_name = profile_dir_name(&name, *profile);
        if exceeds_path_limit(&settings.source, &dir_name) {
            return Err(FlacpipeError::ConfigError(format!(
                "File paths under \"{}\" exceed the {} character limit.\n  Tip: Pass a shorter directory name with --name",
                dir_name,
                discovery::layout::PATH_LIMIT
            )));
        }
    }

    if settings.dry_run {
        run_dry_run(settings, &coordinator, &sources, &name)?;
        return Ok(PipelineResult { batches: vec![] });
    }

    let mut batches = Vec::with_capacity(settings.profiles.len());
    for profile in &settings.profiles {
        let outcome = coordinator.run_batch(
            &settings.source,
            &settings.output_root,
            *profile,
            settings.concurrency_limit,
        )?;
        batches.push(outcome);
    }

    info!(
        "Total run time: {:.2}s",
        run_start.elapsed().as_secs_f64()
    );

    Ok(PipelineResult { batches })
}

/// Dry run mode - print the pipeline each file would run
fn run_dry_run(
    settings: &Settings,
    coordinator: &BatchCoordinator,
    sources: &[PathBuf],
    name: &str,
) -> Result<()> {
    let runner = coordinator.runner(PipelineExecutor::default());

    println!();
    println!("=== DRY RUN MODE ===");

    for profile in &settings.profiles {
        let output_dir = discovery::batch_output_dir(&settings.output_root, name, *profile);
        println!();
        println!("{}/", output_dir.display());
        if output_dir.exists() {
            println!("  (already exists, would be skipped)");
            continue;
        }

        for source in sources {
            let job = TranscodeJob::new(
                source,
                *profile,
                mirror_dir(&settings.source, &output_dir, source),
            );
            match runner.prepare(&job) {
                Ok((_, output, spec)) => {
                    println!("  {}", output.display());
                    println!("    {}", spec);
                }
                Err(e) => println!("  {}: {}", source.display(), e),
            }
        }

        let ancillary = discovery::ancillary_files(&settings.source)?;
        if !ancillary.is_empty() {
            println!("  + {} ancillary files", ancillary.len());
        }
    }
    println!();

    Ok(())
}
