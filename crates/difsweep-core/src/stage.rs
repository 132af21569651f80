//! Stage boundary trait and the failure-isolating stage runner.

use std::fmt::{self, Display};
use std::time::Instant;

use serde::Serialize;

use crate::errors::SweepError;
use crate::params::ParamValue;

/// Classified error captured from a failed stage sub-phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageError {
    /// Short machine readable classification, e.g. `no-input`.
    pub kind: String,
    /// Human readable message.
    pub message: String,
}

impl StageError {
    /// Creates a classified stage error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Elapsed wall-clock time of one completed sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTiming {
    /// Sub-phase name as declared by the stage.
    pub phase: &'static str,
    /// Monotonic elapsed seconds.
    pub seconds: f64,
}

/// Outcome of one stage execution under failure isolation.
///
/// Timings cover exactly the sub-phases that completed; a sub-phase that
/// failed or never ran has no entry (missing, not zero).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StageOutcome {
    /// Every sub-phase completed; `summary` holds the stage's domain
    /// result values, one per summary column.
    Success {
        /// Post-execution domain summary cells.
        summary: Vec<String>,
        /// One timing per sub-phase, in execution order.
        timings: Vec<PhaseTiming>,
    },
    /// A sub-phase failed; later sub-phases were not executed.
    Failure {
        /// The captured classification and message.
        error: StageError,
        /// Timings of the sub-phases that did complete.
        timings: Vec<PhaseTiming>,
    },
}

impl StageOutcome {
    /// Whether every sub-phase completed.
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success { .. })
    }

    /// Timings of the completed sub-phases.
    pub fn timings(&self) -> &[PhaseTiming] {
        match self {
            StageOutcome::Success { timings, .. } | StageOutcome::Failure { timings, .. } => {
                timings
            }
        }
    }

    /// Elapsed seconds of the named sub-phase, when it completed.
    pub fn timing_for(&self, phase: &str) -> Option<f64> {
        self.timings()
            .iter()
            .find(|timing| timing.phase == phase)
            .map(|timing| timing.seconds)
    }
}

/// Boundary to one pipeline stage under sweep.
///
/// Implementations wrap an external analysis operation: they expose the
/// parameter table resolved from the stage's config section, apply bound
/// combinations onto their own options object, execute their ordered
/// sub-phases, and report fixed summary columns after success. `run_phase`
/// is only ever invoked with names from `phases()`, strictly in order.
pub trait SweepStage {
    /// Stable stage identifier used in column names and reports.
    fn stage_id(&self) -> &'static str;

    /// Declared parameter names, in spec order.
    fn param_names(&self) -> Vec<&'static str>;

    /// Size of this stage's parameter product.
    fn combo_count(&self) -> usize;

    /// Decodes one combination of this stage's product.
    fn combo_at(&self, idx: usize) -> Vec<ParamValue>;

    /// Applies one combination onto the stage options object.
    fn bind(&mut self, combo: &[ParamValue]);

    /// Ordered sub-phase names, fixed for the stage's lifetime.
    fn phases(&self) -> &'static [&'static str];

    /// Executes one sub-phase against the pipeline state.
    fn run_phase(&mut self, phase: &'static str) -> Result<(), StageError>;

    /// Fixed domain summary column names.
    fn summary_columns(&self) -> &'static [&'static str];

    /// Domain summary values read from post-execution state; one per
    /// summary column. Only called after every sub-phase completed.
    fn summary_values(&self) -> Vec<String>;

    /// Post-success artifact emission. Failures here are not isolated:
    /// they propagate and abort the sweep.
    fn export(&mut self, run_id: u64) -> Result<(), SweepError> {
        let _ = run_id;
        Ok(())
    }
}

/// Executes every sub-phase of `stage` strictly in order, recording a
/// monotonic timestamp immediately before and after each.
///
/// The first sub-phase error stops the stage: its classification and
/// message are captured, the timings of completed sub-phases are retained,
/// and the failure is returned as data so the sweep continues with the
/// next run. Sub-phases are never retried.
pub fn run_stage(stage: &mut dyn SweepStage) -> StageOutcome {
    let phases = stage.phases();
    let mut timings = Vec::with_capacity(phases.len());
    for &phase in phases {
        let started = Instant::now();
        if let Err(error) = stage.run_phase(phase) {
            return StageOutcome::Failure { error, timings };
        }
        timings.push(PhaseTiming {
            phase,
            seconds: started.elapsed().as_secs_f64(),
        });
    }
    StageOutcome::Success {
        summary: stage.summary_values(),
        timings,
    }
}
