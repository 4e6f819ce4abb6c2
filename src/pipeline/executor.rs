//! Pipeline execution
//!
//! Runs a [`PipelineSpec`] the way a shell runs `a | b | c`, except that the
//! exit status and stderr of every stage are collected, not just the last.
//!
//! Stage i's stdout is handed straight to stage i+1's stdin. The parent keeps
//! no copy of any pipe end, so when a stage dies its upstream neighbour gets
//! SIGPIPE instead of blocking forever. Each stage's stderr is drained on its
//! own scoped thread while that thread waits on the stage, so a chatty stage
//! can never wedge on a full stderr pipe.

use super::supervisor::{GroupRegistration, ProcessSupervisor};
use crate::types::{PipelineSpec, StageExit, StageResult};
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, trace};

/// Spawns and reaps pipelines, registering each with a supervisor
#[derive(Debug, Clone, Default)]
pub struct PipelineExecutor {
    supervisor: Arc<ProcessSupervisor>,
}

impl PipelineExecutor {
    pub fn new(supervisor: Arc<ProcessSupervisor>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Run every stage and return one result per stage, in stage order.
    ///
    /// Never fails as a whole: a stage that cannot be started is reported as
    /// [`StageExit::NotStarted`] and the stages after it are not spawned.
    pub fn execute(&self, spec: &PipelineSpec) -> Vec<StageResult> {
        let stage_count = spec.len();
        let mut stages: Vec<Result<Child, String>> = Vec::with_capacity(stage_count);
        let mut upstream: Option<ChildStdout> = None;
        let mut registration: Option<GroupRegistration<'_>> = None;

        for (index, stage) in spec.stages.iter().enumerate() {
            if stages.iter().any(|s| s.is_err()) {
                stages.push(Err("not started: an earlier stage failed to start".to_string()));
                continue;
            }

            let is_last = index + 1 == stage_count;
            let mut command = Command::new(&stage.program);
            command
                .args(&stage.arguments)
                .stdin(upstream.take().map(Stdio::from).unwrap_or_else(Stdio::null))
                .stdout(if is_last { Stdio::null() } else { Stdio::piped() })
                .stderr(Stdio::piped())
                .process_group(registration.as_ref().map_or(0, |r| r.pgid()));

            debug!("Starting stage {}: {}", index, stage);
            match command.spawn() {
                Ok(mut child) => {
                    if registration.is_none() {
                        registration = Some(self.supervisor.register(child.id() as i32));
                    }
                    upstream = child.stdout.take();
                    stages.push(Ok(child));
                }
                Err(e) => {
                    stages.push(Err(format!("failed to start `{}`: {}", stage, e)));
                }
            }
            // Dropping `command` here closes our copy of the upstream read end
        }
        drop(upstream);

        if let Some(registration) = &registration {
            self.supervisor.enforce(registration.pgid());
        }

        let results = std::thread::scope(|scope| {
            let handles: Vec<_> = stages
                .into_iter()
                .map(|stage| scope.spawn(move || reap(stage)))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        StageResult::new(StageExit::NotStarted, "stage reaper panicked")
                    })
                })
                .collect::<Vec<_>>()
        });

        for (index, result) in results.iter().enumerate() {
            trace!("Stage {} finished with {}", index, result.exit);
        }

        results
    }
}

/// Drain a stage's stderr to EOF, then collect its exit status
fn reap(stage: Result<Child, String>) -> StageResult {
    let mut child = match stage {
        Ok(child) => child,
        Err(message) => return StageResult::new(StageExit::NotStarted, message),
    };

    let mut stderr = Vec::new();
    if let Some(mut pipe) = child.stderr.take() {
        if let Err(e) = pipe.read_to_end(&mut stderr) {
            debug!("Error reading stage stderr: {}", e);
        }
    }

    let exit = match child.wait() {
        Ok(status) => StageExit::from_status(status),
        Err(e) => {
            stderr.extend_from_slice(format!("\nfailed to wait for stage: {}", e).as_bytes());
            StageExit::NotStarted
        }
    };

    StageResult::new(exit, String::from_utf8_lossy(&stderr).trim_end())
}

/// Why a pipeline failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFailure {
    /// A stage exited abnormally for its own reasons: the root cause
    Definitive { stage: usize, result: StageResult },
    /// Only SIGPIPE deaths were seen; reported when nothing better exists
    BrokenPipe { stage: usize, result: StageResult },
}

impl PipelineFailure {
    pub fn stage(&self) -> usize {
        match self {
            PipelineFailure::Definitive { stage, .. } | PipelineFailure::BrokenPipe { stage, .. } => *stage,
        }
    }

    pub fn result(&self) -> &StageResult {
        match self {
            PipelineFailure::Definitive { result, .. } | PipelineFailure::BrokenPipe { result, .. } => result,
        }
    }
}

/// Decide whether a pipeline succeeded.
///
/// Because stages run as a pipe chain, the earliest abnormal exit is usually
/// the root cause. SIGPIPE is back-pressure from a later stage dying, so it
/// only counts when no stage failed for any other reason.
pub fn classify(results: &[StageResult]) -> Result<(), PipelineFailure> {
    let mut last_broken_pipe = None;

    for (stage, result) in results.iter().enumerate() {
        if result.exit.success() {
            continue;
        }
        if result.exit.is_broken_pipe() {
            last_broken_pipe = Some(stage);
            continue;
        }
        return Err(PipelineFailure::Definitive {
            stage,
            result: result.clone(),
        });
    }

    match last_broken_pipe {
        Some(stage) => Err(PipelineFailure::BrokenPipe {
            stage,
            result: results[stage].clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageCommand;

    fn sh(script: &str) -> StageCommand {
        StageCommand::new("sh", ["-c", script])
    }

    fn run(stages: Vec<StageCommand>) -> Vec<StageResult> {
        PipelineExecutor::default().execute(&PipelineSpec::new(stages))
    }

    #[test]
    fn test_one_result_per_stage_on_success() {
        let results = run(vec![sh("echo hello"), sh("cat"), sh("cat >/dev/null")]);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.exit.success()));
        assert!(classify(&results).is_ok());
    }

    #[test]
    fn test_data_streams_between_stages() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.txt");
        let results = run(vec![
            sh("printf 'a\\nb\\nc\\n'"),
            sh("tr a-z A-Z"),
            StageCommand::new("sh", ["-c", "cat > \"$1\"", "sh", out.to_str().unwrap()]),
        ]);
        assert!(classify(&results).is_ok());
        assert_eq!(std::fs::read_to_string(out).unwrap(), "A\nB\nC\n");
    }

    #[test]
    fn test_upstream_failure_is_root_cause() {
        // Stage 0 fails for real; stage 1 exits quietly on EOF
        let results = run(vec![sh("echo 'bad sync' >&2; exit 3"), sh("cat >/dev/null")]);
        assert_eq!(results.len(), 2);
        let failure = classify(&results).unwrap_err();
        assert_eq!(failure.stage(), 0);
        assert_eq!(failure.result().exit, StageExit::Code(3));
        assert_eq!(failure.result().stderr, "bad sync");
    }

    #[test]
    fn test_final_stage_failure_reported_with_stderr() {
        let results = run(vec![sh("echo data"), sh("cat >/dev/null; echo 'encoder died' >&2; exit 2")]);
        let failure = classify(&results).unwrap_err();
        assert!(matches!(failure, PipelineFailure::Definitive { stage: 1, .. }));
        assert_eq!(failure.result().stderr, "encoder died");
    }

    #[test]
    fn test_upstream_gets_sigpipe_when_downstream_exits() {
        // `yes` writes forever; the consumer exits immediately with an error
        let results = run(vec![
            StageCommand::new("yes", Vec::<String>::new()),
            sh("echo 'cannot open output' >&2; exit 1"),
        ]);
        assert_eq!(results[0].exit, StageExit::Signal(libc::SIGPIPE));
        let failure = classify(&results).unwrap_err();
        assert_eq!(failure.stage(), 1);
        assert_eq!(failure.result().stderr, "cannot open output");
    }

    #[test]
    fn test_missing_program_reports_every_stage() {
        let results = run(vec![
            sh("echo data"),
            StageCommand::new("/nonexistent/flacpipe-encoder", ["-"]),
            sh("cat"),
        ]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[1].exit, StageExit::NotStarted);
        assert_eq!(results[2].exit, StageExit::NotStarted);
        assert_eq!(classify(&results).unwrap_err().stage(), 1);
    }

    #[test]
    fn test_large_stderr_does_not_deadlock() {
        let results = run(vec![
            sh("i=0; while [ $i -lt 20000 ]; do echo 'warning: clipping' >&2; i=$((i+1)); done; echo done"),
            sh("cat >/dev/null"),
        ]);
        assert!(results[0].exit.success());
        assert!(results[0].stderr.len() > 65_536);
    }

    #[test]
    fn test_group_unregistered_after_run() {
        let executor = PipelineExecutor::default();
        executor.execute(&PipelineSpec::new(vec![sh("true"), sh("cat")]));
        assert!(executor.supervisor().live_groups().is_empty());
    }

    #[test]
    fn test_classify_definitive_before_broken_pipe() {
        let results = vec![
            StageResult::new(StageExit::Signal(libc::SIGPIPE), ""),
            StageResult::new(StageExit::Code(1), "decoder error"),
            StageResult::new(StageExit::Signal(libc::SIGPIPE), ""),
        ];
        assert_eq!(
            classify(&results),
            Err(PipelineFailure::Definitive {
                stage: 1,
                result: results[1].clone()
            })
        );
    }

    #[test]
    fn test_classify_earliest_definitive_wins() {
        let results = vec![
            StageResult::new(StageExit::Code(1), "first"),
            StageResult::new(StageExit::Code(2), "second"),
        ];
        assert_eq!(classify(&results).unwrap_err().result().stderr, "first");
    }

    #[test]
    fn test_classify_only_broken_pipe() {
        let results = vec![
            StageResult::new(StageExit::Signal(libc::SIGPIPE), ""),
            StageResult::new(StageExit::Signal(libc::SIGPIPE), "second"),
            StageResult::new(StageExit::Code(0), ""),
        ];
        assert!(matches!(
            classify(&results),
            Err(PipelineFailure::BrokenPipe { stage: 1, .. })
        ));
    }

    #[test]
    fn test_classify_other_signals_are_definitive() {
        let results = vec![StageResult::new(StageExit::Signal(libc::SIGTERM), "")];
        assert!(matches!(
            classify(&results),
            Err(PipelineFailure::Definitive { stage: 0, .. })
        ));
    }
}
