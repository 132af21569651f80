//! The run coordinator: enumerates the cross-stage product and drives each
//! run through bind, execution, and row emission.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use crate::errors::SweepError;
use crate::params::ParamValue;
use crate::stage::{run_stage, StageOutcome, SweepStage};
use crate::table::{Schema, TableWriter};

/// Disposition of one stage within one emitted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StageReport {
    /// The stage was bound and executed for this row's combination.
    Ran(StageOutcome),
    /// An earlier stage failed; this stage was neither bound nor executed.
    Skipped,
}

/// Everything observed for one run, handed to the observer after its row
/// has been written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Zero-based run identifier, strictly increasing by one per row.
    pub run_id: u64,
    /// Per-stage dispositions, in declared stage order.
    pub stages: Vec<(&'static str, StageReport)>,
}

impl RunReport {
    /// Whether every active stage ran and succeeded for this run.
    pub fn fully_succeeded(&self) -> bool {
        self.stages
            .iter()
            .all(|(_, report)| matches!(report, StageReport::Ran(outcome) if outcome.is_success()))
    }
}

/// Mutable session record threaded through the sweep. Explicit state, no
/// process-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepStats {
    /// Rows written (runs executed).
    pub runs: u64,
    /// Runs in which every active stage succeeded.
    pub completed: u64,
    /// Failed stage executions per stage id.
    pub stage_failures: BTreeMap<String, u64>,
}

/// Drives the full sweep over the active stages, in declared order.
///
/// Stages nest: the first stage executes once per combination of its own
/// product, and while it succeeds the next stage iterates its full product
/// against that result, so a fully successful sweep emits the complete
/// Cartesian product across stages, outer combinations varying slowest.
/// When a stage fails, the entire block below it collapses into a single
/// row carrying the sentinel columns for every deeper stage (no binding,
/// no execution), and the sweep moves on to the next combination. Each
/// row is durable, and any artifact export for the runs it covers has
/// happened, before the next combination executes. Errors outside the
/// per-stage failure boundary (table IO, artifact export) abort the sweep.
pub fn run_sweep<W, F>(
    stages: &mut [Box<dyn SweepStage>],
    writer: &mut TableWriter<W>,
    mut observe: F,
) -> Result<SweepStats, SweepError>
where
    W: Write,
    F: FnMut(&RunReport),
{
    let schema = Schema::for_stages(stages);
    writer.write_header(&schema)?;
    let mut session = Session {
        schema: &schema,
        writer,
        observe: &mut observe,
        stats: SweepStats::default(),
        next_run_id: 0,
    };
    if !stages.is_empty() {
        sweep_level(stages, 0, &mut Vec::new(), &mut session)?;
    }
    Ok(session.stats)
}

struct Session<'a, W: Write, F: FnMut(&RunReport)> {
    schema: &'a Schema,
    writer: &'a mut TableWriter<W>,
    observe: &'a mut F,
    stats: SweepStats,
    next_run_id: u64,
}

/// One executed stage within the current prefix: the combination bound to
/// it and the outcome it produced.
struct Executed {
    combo: Vec<ParamValue>,
    outcome: StageOutcome,
}

fn sweep_level<W, F>(
    stages: &mut [Box<dyn SweepStage>],
    level: usize,
    prefix: &mut Vec<Executed>,
    session: &mut Session<'_, W, F>,
) -> Result<(), SweepError>
where
    W: Write,
    F: FnMut(&RunReport),
{
    for idx in 0..stages[level].combo_count() {
        let combo = stages[level].combo_at(idx);
        stages[level].bind(&combo);
        let outcome = run_stage(stages[level].as_mut());
        let succeeded = outcome.is_success();
        if succeeded {
            stages[level].export(session.next_run_id)?;
        } else {
            *session
                .stats
                .stage_failures
                .entry(stages[level].stage_id().to_string())
                .or_insert(0) += 1;
        }
        prefix.push(Executed { combo, outcome });
        if succeeded && level + 1 < stages.len() {
            sweep_level(stages, level + 1, prefix, session)?;
        } else {
            emit_row(prefix, session)?;
        }
        prefix.pop();
    }
    Ok(())
}

fn emit_row<W, F>(prefix: &[Executed], session: &mut Session<'_, W, F>) -> Result<(), SweepError>
where
    W: Write,
    F: FnMut(&RunReport),
{
    let run_id = session.next_run_id;
    let mut row = Vec::with_capacity(session.schema.width());
    row.push(run_id.to_string());
    let mut reports = Vec::with_capacity(session.schema.groups().len());
    for (pos, group) in session.schema.groups().iter().enumerate() {
        match prefix.get(pos) {
            Some(executed) => {
                row.extend(executed.combo.iter().map(ToString::to_string));
                row.extend(group.outcome_cells(&executed.outcome));
                reports.push((group.stage_id, StageReport::Ran(executed.outcome.clone())));
            }
            None => {
                row.extend(vec!["-".to_string(); group.params.len()]);
                row.extend(group.skipped_cells());
                reports.push((group.stage_id, StageReport::Skipped));
            }
        }
    }
    session.writer.write_row(session.schema, &row)?;

    let report = RunReport {
        run_id,
        stages: reports,
    };
    (session.observe)(&report);
    session.stats.runs += 1;
    if report.fully_succeeded() {
        session.stats.completed += 1;
    }
    session.next_run_id += 1;
    Ok(())
}
