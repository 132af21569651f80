use std::cell::RefCell;
use std::rc::Rc;

use difsweep_core::{
    run_sweep, ParamValue, RunReport, StageError, SweepError, SweepStage, SweepStats, TableWriter,
};

/// Scriptable stage used to exercise the coordinator without a real
/// pipeline behind it.
struct FakeStage {
    id: &'static str,
    params: &'static [&'static str],
    combos: Vec<Vec<ParamValue>>,
    fail_phase: Option<&'static str>,
    bound: Vec<ParamValue>,
    executions: u64,
    exports: Rc<RefCell<Vec<u64>>>,
}

impl FakeStage {
    fn new(
        id: &'static str,
        params: &'static [&'static str],
        combos: Vec<Vec<ParamValue>>,
    ) -> Self {
        Self {
            id,
            params,
            combos,
            fail_phase: None,
            bound: Vec::new(),
            executions: 0,
            exports: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn failing(mut self, phase: &'static str) -> Self {
        self.fail_phase = Some(phase);
        self
    }

    fn export_log(&self) -> Rc<RefCell<Vec<u64>>> {
        Rc::clone(&self.exports)
    }
}

impl SweepStage for FakeStage {
    fn stage_id(&self) -> &'static str {
        self.id
    }

    fn param_names(&self) -> Vec<&'static str> {
        self.params.to_vec()
    }

    fn combo_count(&self) -> usize {
        self.combos.len()
    }

    fn combo_at(&self, idx: usize) -> Vec<ParamValue> {
        self.combos[idx].clone()
    }

    fn bind(&mut self, combo: &[ParamValue]) {
        self.bound = combo.to_vec();
    }

    fn phases(&self) -> &'static [&'static str] {
        &["prepare", "measure"]
    }

    fn run_phase(&mut self, phase: &'static str) -> Result<(), StageError> {
        if phase == "prepare" {
            self.executions += 1;
        }
        if self.fail_phase == Some(phase) {
            return Err(StageError::new("synthetic", "scripted sub-phase failure"));
        }
        Ok(())
    }

    fn summary_columns(&self) -> &'static [&'static str] {
        &["count"]
    }

    fn summary_values(&self) -> Vec<String> {
        vec![self.executions.to_string()]
    }

    fn export(&mut self, run_id: u64) -> Result<(), SweepError> {
        self.exports.borrow_mut().push(run_id);
        Ok(())
    }
}

fn ints(values: &[i64]) -> Vec<Vec<ParamValue>> {
    values.iter().map(|v| vec![ParamValue::Int(*v)]).collect()
}

fn run_to_rows(
    stages: &mut [Box<dyn SweepStage>],
) -> (Vec<Vec<String>>, Vec<RunReport>, SweepStats) {
    let mut writer = TableWriter::new(Vec::new());
    let mut reports = Vec::new();
    let stats = run_sweep(stages, &mut writer, |report| reports.push(report.clone()))
        .expect("sweep");
    let bytes = writer.into_inner().expect("into_inner");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(bytes.as_slice());
    let rows = reader
        .records()
        .map(|record| {
            record
                .expect("record")
                .iter()
                .map(|cell| cell.to_string())
                .collect::<Vec<_>>()
        })
        .collect();
    (rows, reports, stats)
}

#[test]
fn all_success_emits_the_full_product() {
    let one = FakeStage::new("one", &["a"], ints(&[1, 2]));
    let two = FakeStage::new("two", &["b"], ints(&[7, 8, 9]));
    let one_exports = one.export_log();
    let two_exports = two.export_log();
    let mut stages: Vec<Box<dyn SweepStage>> = vec![Box::new(one), Box::new(two)];

    let (rows, reports, stats) = run_to_rows(&mut stages);

    assert_eq!(rows.len(), 1 + 6);
    let header = &rows[0];
    assert_eq!(
        header,
        &vec![
            "run-id".to_string(),
            "a".to_string(),
            "one-ran".to_string(),
            "time-prepare".to_string(),
            "time-measure".to_string(),
            "count".to_string(),
            "b".to_string(),
            "two-ran".to_string(),
            "time-prepare".to_string(),
            "time-measure".to_string(),
            "count".to_string(),
        ]
    );
    for (idx, row) in rows[1..].iter().enumerate() {
        assert_eq!(row.len(), header.len());
        assert_eq!(row[0], idx.to_string());
        assert_eq!(row[2], "1");
        assert_eq!(row[7], "1");
    }
    // Outer combinations vary slowest; inner fastest.
    assert_eq!(rows[1][1], "1");
    assert_eq!(rows[1][6], "7");
    assert_eq!(rows[3][6], "9");
    assert_eq!(rows[4][1], "2");
    assert_eq!(rows[4][6], "7");
    // The outer stage ran once per its own combination, not once per row.
    assert_eq!(rows[1][5], "1");
    assert_eq!(rows[3][5], "1");
    assert_eq!(rows[4][5], "2");
    assert_eq!(stats.runs, 6);
    assert_eq!(stats.completed, 6);
    assert!(stats.stage_failures.is_empty());
    assert_eq!(*one_exports.borrow(), vec![0, 3]);
    assert_eq!(*two_exports.borrow(), vec![0, 1, 2, 3, 4, 5]);
    assert!(reports.iter().all(RunReport::fully_succeeded));
}

#[test]
fn failing_first_stage_collapses_each_inner_block() {
    let one = FakeStage::new("one", &["a"], ints(&[1, 2])).failing("measure");
    let two = FakeStage::new("two", &["b"], ints(&[7, 8, 9]));
    let two_exports = two.export_log();
    let mut stages: Vec<Box<dyn SweepStage>> = vec![Box::new(one), Box::new(two)];

    let (rows, reports, stats) = run_to_rows(&mut stages);

    // One row per outer combination; the inner product never unrolls.
    assert_eq!(rows.len(), 1 + 2);
    for (idx, row) in rows[1..].iter().enumerate() {
        assert_eq!(row[0], idx.to_string());
        assert_eq!(row[2], "0");
        // `prepare` completed before `measure` failed: its timing is
        // present, the rest of the outcome cells are missing.
        assert!(!row[3].is_empty());
        assert!(row[3].parse::<f64>().is_ok());
        assert_eq!(row[4], "");
        assert_eq!(row[5], "");
        // Every inner-stage column is the fixed sentinel.
        for cell in &row[6..] {
            assert_eq!(cell, "-");
        }
    }
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.stage_failures.get("one"), Some(&2));
    assert!(two_exports.borrow().is_empty());
    assert!(reports.iter().all(|report| !report.fully_succeeded()));
}

#[test]
fn failing_inner_stage_still_unrolls_the_product() {
    let one = FakeStage::new("one", &["a"], ints(&[1, 2]));
    let two = FakeStage::new("two", &["b"], ints(&[7, 8])).failing("prepare");
    let mut stages: Vec<Box<dyn SweepStage>> = vec![Box::new(one), Box::new(two)];

    let (rows, _, stats) = run_to_rows(&mut stages);

    assert_eq!(rows.len(), 1 + 4);
    for row in &rows[1..] {
        assert_eq!(row[2], "1");
        assert_eq!(row[7], "0");
        // `prepare` itself failed: no timings at all for the inner stage.
        assert_eq!(row[8], "");
        assert_eq!(row[9], "");
    }
    assert_eq!(stats.stage_failures.get("two"), Some(&4));
    assert_eq!(stats.completed, 0);
}

#[test]
fn empty_inner_product_yields_zero_rows() {
    let one = FakeStage::new("one", &["a"], ints(&[1, 2]));
    let two = FakeStage::new("two", &["b"], Vec::new());
    let mut stages: Vec<Box<dyn SweepStage>> = vec![Box::new(one), Box::new(two)];

    let (rows, reports, stats) = run_to_rows(&mut stages);

    assert_eq!(rows.len(), 1);
    assert!(reports.is_empty());
    assert_eq!(stats.runs, 0);
}

#[test]
fn empty_stage_list_writes_header_only() {
    let mut stages: Vec<Box<dyn SweepStage>> = Vec::new();
    let (rows, reports, stats) = run_to_rows(&mut stages);

    assert_eq!(rows, vec![vec!["run-id".to_string()]]);
    assert!(reports.is_empty());
    assert_eq!(stats, SweepStats::default());
}

#[test]
fn single_stage_sweep_rows_match_its_product() {
    let one = FakeStage::new("one", &["a"], ints(&[5, 6, 7]));
    let mut stages: Vec<Box<dyn SweepStage>> = vec![Box::new(one)];

    let (rows, _, stats) = run_to_rows(&mut stages);

    assert_eq!(rows.len(), 1 + 3);
    assert_eq!(rows[1][1], "5");
    assert_eq!(rows[3][1], "7");
    assert_eq!(stats.completed, 3);
}
