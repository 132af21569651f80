//! Fixed-schema result table: column layout and the CSV row writer.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use serde::Serialize;

use crate::errors::{ErrorInfo, SweepError};
use crate::stage::{StageOutcome, SweepStage};

/// Column layout contributed by one active stage: its parameter columns
/// followed by its fixed outcome columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnGroup {
    /// Stage identifier the group belongs to.
    pub stage_id: &'static str,
    /// Parameter column names, in spec order.
    pub params: Vec<&'static str>,
    /// Sub-phase names; each contributes a `time-<phase>` column.
    pub phases: Vec<&'static str>,
    /// Domain summary column names.
    pub summaries: Vec<&'static str>,
}

impl ColumnGroup {
    /// Derives the group from a stage's declared surface.
    pub fn for_stage(stage: &dyn SweepStage) -> Self {
        Self {
            stage_id: stage.stage_id(),
            params: stage.param_names(),
            phases: stage.phases().to_vec(),
            summaries: stage.summary_columns().to_vec(),
        }
    }

    /// Number of outcome cells the group contributes to every row.
    pub fn outcome_width(&self) -> usize {
        1 + self.phases.len() + self.summaries.len()
    }

    fn outcome_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.outcome_width());
        names.push(format!("{}-ran", self.stage_id));
        for phase in &self.phases {
            names.push(format!("time-{phase}"));
        }
        for summary in &self.summaries {
            names.push(summary.to_string());
        }
        names
    }

    /// Outcome cells for a stage that executed this run.
    ///
    /// Success: ran flag `1`, per-phase seconds, summary values. Failure:
    /// ran flag `0`, seconds for completed sub-phases, empty cells for
    /// missing timings and summaries — missing, not zero.
    pub fn outcome_cells(&self, outcome: &StageOutcome) -> Vec<String> {
        let mut cells = Vec::with_capacity(self.outcome_width());
        match outcome {
            StageOutcome::Success { summary, .. } => {
                assert_eq!(
                    summary.len(),
                    self.summaries.len(),
                    "stage summary arity does not match its declared columns"
                );
                cells.push("1".to_string());
                for phase in &self.phases {
                    cells.push(format_seconds(outcome.timing_for(phase)));
                }
                cells.extend(summary.iter().cloned());
            }
            StageOutcome::Failure { .. } => {
                cells.push("0".to_string());
                for phase in &self.phases {
                    cells.push(format_seconds(outcome.timing_for(phase)));
                }
                cells.extend(std::iter::repeat(String::new()).take(self.summaries.len()));
            }
        }
        cells
    }

    /// The fixed sentinel cells for a stage skipped because an earlier
    /// stage in the same run failed.
    pub fn skipped_cells(&self) -> Vec<String> {
        vec!["-".to_string(); self.outcome_width()]
    }
}

fn format_seconds(seconds: Option<f64>) -> String {
    match seconds {
        Some(value) => format!("{value:.4}"),
        None => String::new(),
    }
}

/// Sweep-wide column layout, built once from the active stages before the
/// first run. Row width is an invariant of the schema, not a runtime
/// accumulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    groups: Vec<ColumnGroup>,
}

impl Schema {
    /// Builds the schema for the active stages, in declared order.
    pub fn for_stages(stages: &[Box<dyn SweepStage>]) -> Self {
        Self {
            groups: stages
                .iter()
                .map(|stage| ColumnGroup::for_stage(stage.as_ref()))
                .collect(),
        }
    }

    /// Per-stage column groups.
    pub fn groups(&self) -> &[ColumnGroup] {
        &self.groups
    }

    /// The header row: `run-id`, then per stage its parameter names and
    /// outcome column names.
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.width());
        header.push("run-id".to_string());
        for group in &self.groups {
            header.extend(group.params.iter().map(|name| name.to_string()));
            header.extend(group.outcome_names());
        }
        header
    }

    /// Total row width including the run id column.
    pub fn width(&self) -> usize {
        1 + self
            .groups
            .iter()
            .map(|group| group.params.len() + group.outcome_width())
            .sum::<usize>()
    }
}

/// Appends schema-consistent rows to a CSV stream.
///
/// Every record is flushed as soon as it is written so a completed run's
/// row is durable before the next run starts.
pub struct TableWriter<W: Write> {
    inner: csv::Writer<W>,
}

impl TableWriter<File> {
    /// Creates the output table file, truncating any previous sweep.
    pub fn create(path: &Path) -> Result<Self, SweepError> {
        let file = File::create(path).map_err(|err| {
            SweepError::Io(
                ErrorInfo::new("table-create", "failed to create output table")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        Ok(Self::new(file))
    }
}

impl<W: Write> TableWriter<W> {
    /// Wraps an output stream in a row writer.
    pub fn new(writer: W) -> Self {
        Self {
            inner: WriterBuilder::new().has_headers(false).from_writer(writer),
        }
    }

    /// Writes the header row. Called exactly once, before any data row.
    pub fn write_header(&mut self, schema: &Schema) -> Result<(), SweepError> {
        self.write_record(&schema.header())
    }

    /// Appends one run row and flushes it. The row must match the schema
    /// width; a mismatch is a programming error.
    pub fn write_row(&mut self, schema: &Schema, row: &[String]) -> Result<(), SweepError> {
        assert_eq!(
            row.len(),
            schema.width(),
            "row width does not match the sweep schema"
        );
        self.write_record(row)
    }

    fn write_record(&mut self, record: &[String]) -> Result<(), SweepError> {
        self.inner
            .write_record(record)
            .map_err(|err| wrap_csv("table-write", err))?;
        self.inner
            .flush()
            .map_err(|err| wrap_csv("table-flush", err.into()))
    }

    /// Consumes the writer, returning the underlying stream.
    pub fn into_inner(self) -> Result<W, SweepError> {
        self.inner
            .into_inner()
            .map_err(|err| wrap_csv("table-finish", err.into_error().into()))
    }
}

fn wrap_csv(code: &str, err: csv::Error) -> SweepError {
    SweepError::Io(ErrorInfo::new(code, "output table failure").with_hint(err.to_string()))
}
