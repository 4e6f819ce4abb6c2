//! flacpipe CLI entry point

use clap::Parser;
use flacpipe::config::{Cli, Settings};
use flacpipe::pipeline::{self, BatchCoordinator, BatchOutcome};
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli);

    // Validate inputs
    if let Err(e) = validate_inputs(&cli) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    // Build settings from CLI
    let settings = Settings::from_cli(&cli);
    let coordinator = pipeline::coordinator_for(&settings, BatchCoordinator::with_lofty());

    // Ctrl-C and SIGTERM tear down every running pipeline, then roll back
    let cancel = coordinator.cancel_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Interrupted, stopping transcodes...");
        cancel.cancel();
    }) {
        warn!("Could not install interrupt handler: {}", e);
    }

    match pipeline::run_with(&settings, &coordinator) {
        Ok(result) => {
            for batch in &result.batches {
                match batch {
                    BatchOutcome::Transcoded { dir, files } => {
                        println!("Transcoded {} files into {}", files, dir.display());
                    }
                    BatchOutcome::AlreadyExists { dir } => {
                        println!("Already exists, skipped: {}", dir.display());
                    }
                    BatchOutcome::PassThrough { dir } => {
                        println!("No transcode needed, source is already lossless 16 bit: {}", dir.display());
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        tracing::Level::ERROR
    } else {
        cli.log_level()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase())),
        )
        .with_target(false)
        .init();
}

fn validate_inputs(cli: &Cli) -> Result<(), String> {
    if !cli.source.is_dir() {
        return Err(format!(
            "Source directory does not exist: {}\n\n  Tip: Pass the directory that contains the FLAC files.\n  Example:\n    flacpipe -f v0 ~/Music/Album",
            cli.source.display()
        ));
    }

    if let Some(output) = &cli.output {
        if !output.is_dir() {
            return Err(format!(
                "Output directory does not exist: {}\n\n  Tip: Create it first: mkdir -p {}",
                output.display(),
                output.display()
            ));
        }
    }

    if cli.threads == Some(0) {
        return Err("--threads must be at least 1".to_string());
    }

    Ok(())
}
