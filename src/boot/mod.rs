//! CS-018: On-instance boot runner.
//!
//! Native counterpart of the rendered user data: prepares the volume through
//! a [`ScriptRunner`], then writes and verifies the numbers file directly.
//! The steps are independent. A failed volume step is recorded and logged,
//! and the numbers file is written regardless.

use crate::core::sequence::{self, SequenceCheck};
use crate::core::types::{BootEvent, BootStep, BootstrapSpec};
use crate::provenance::{eventlog, hasher};
use crate::resources::mount;
use crate::transport::ScriptRunner;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure of a single boot step.
#[derive(Debug, Error)]
pub enum BootError {
    /// Format or mount failed
    #[error("volume {device}: {reason}")]
    Volume { device: String, reason: String },

    /// Numbers file could not be written
    #[error("cannot write {}: {source}", path.display())]
    NumberFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Numbers file was written but reads back wrong
    #[error("{} failed verification: {detail}", path.display())]
    Verify { path: PathBuf, detail: String },
}

/// What to run.
#[derive(Debug, Clone)]
pub struct BootOptions<'a> {
    pub spec: &'a BootstrapSpec,
    /// Directory for the JSONL event log; no log when unset
    pub state_dir: Option<&'a Path>,
    pub skip_volume: bool,
}

/// Result of one step.
#[derive(Debug)]
pub enum StepOutcome {
    Completed { hash: Option<String> },
    Failed(BootError),
    Skipped,
}

#[derive(Debug)]
pub struct StepReport {
    pub step: BootStep,
    pub outcome: StepOutcome,
    pub duration: Duration,
}

/// Summary of a boot run.
#[derive(Debug)]
pub struct BootReport {
    pub run_id: String,
    pub steps: Vec<StepReport>,
    pub total: Duration,
}

impl BootReport {
    pub fn completed(&self) -> u32 {
        self.count(|o| matches!(o, StepOutcome::Completed { .. }))
    }

    pub fn failed(&self) -> u32 {
        self.count(|o| matches!(o, StepOutcome::Failed(_)))
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    pub fn step(&self, step: BootStep) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == step)
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> u32 {
        self.steps.iter().filter(|s| pred(&s.outcome)).count() as u32
    }
}

fn record(state_dir: Option<&Path>, event: BootEvent) {
    if let Some(dir) = state_dir {
        if let Err(e) = eventlog::append_event(dir, event) {
            tracing::warn!(error = %e, "event log append failed");
        }
    }
}

/// Run the prepare script; the step hash is the hash of the script that ran.
fn prepare_volume(spec: &BootstrapSpec, runner: &dyn ScriptRunner) -> Result<Option<String>, BootError> {
    let volume_err = |reason: String| BootError::Volume {
        device: spec.device.clone(),
        reason,
    };
    let script = mount::prepare_script(spec);
    let out = runner.run(&script).map_err(volume_err)?;
    if !out.success() {
        return Err(volume_err(out.failure_reason()));
    }
    Ok(Some(hasher::hash_string(&script)))
}

fn write_numbers(spec: &BootstrapSpec) -> Result<Option<String>, BootError> {
    let path = PathBuf::from(&spec.numbers_path);
    sequence::write_sequence(&path, spec.sequence).map_err(|source| BootError::NumberFile {
        path: path.clone(),
        source,
    })?;
    match sequence::verify_file(&path, spec.sequence) {
        Ok(SequenceCheck::Valid { .. }) => {}
        Ok(other) => {
            return Err(BootError::Verify {
                path,
                detail: other.to_string(),
            })
        }
        Err(detail) => return Err(BootError::Verify { path, detail }),
    }
    Ok(hasher::hash_file(&path).ok())
}

fn run_step(
    step: BootStep,
    state_dir: Option<&Path>,
    f: impl FnOnce() -> Result<Option<String>, BootError>,
) -> StepReport {
    let start = Instant::now();
    record(state_dir, BootEvent::StepStarted { step });
    tracing::info!(%step, "step started");

    let outcome = match f() {
        Ok(hash) => {
            let secs = start.elapsed().as_secs_f64();
            tracing::info!(%step, duration_seconds = secs, hash = hash.as_deref().unwrap_or("-"), "step completed");
            record(
                state_dir,
                BootEvent::StepCompleted {
                    step,
                    duration_seconds: secs,
                    hash: hash.clone(),
                },
            );
            StepOutcome::Completed { hash }
        }
        Err(e) => {
            tracing::warn!(%step, error = %e, "step failed, continuing");
            record(
                state_dir,
                BootEvent::StepFailed {
                    step,
                    error: e.to_string(),
                },
            );
            StepOutcome::Failed(e)
        }
    };

    StepReport {
        step,
        outcome,
        duration: start.elapsed(),
    }
}

/// Run both boot steps and report what happened.
pub fn run(opts: &BootOptions, runner: &dyn ScriptRunner) -> BootReport {
    let start = Instant::now();
    let run_id = eventlog::generate_run_id();
    let state_dir = opts.state_dir;

    tracing::info!(%run_id, device = %opts.spec.device, numbers = %opts.spec.numbers_path, "boot started");
    record(
        state_dir,
        BootEvent::BootStarted {
            run_id: run_id.clone(),
            cloudstrap_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );

    let mut steps = Vec::with_capacity(2);
    if opts.skip_volume {
        tracing::info!(step = %BootStep::Volume, "step skipped");
        steps.push(StepReport {
            step: BootStep::Volume,
            outcome: StepOutcome::Skipped,
            duration: Duration::ZERO,
        });
    } else {
        steps.push(run_step(BootStep::Volume, state_dir, || {
            prepare_volume(opts.spec, runner)
        }));
    }
    steps.push(run_step(BootStep::Numbers, state_dir, || write_numbers(opts.spec)));

    let report = BootReport {
        run_id,
        steps,
        total: start.elapsed(),
    };
    record(
        state_dir,
        BootEvent::BootCompleted {
            run_id: report.run_id.clone(),
            steps_completed: report.completed(),
            steps_failed: report.failed(),
            total_seconds: report.total.as_secs_f64(),
        },
    );
    tracing::info!(
        run_id = %report.run_id,
        completed = report.completed(),
        failed = report.failed(),
        "boot finished"
    );
    report
}
