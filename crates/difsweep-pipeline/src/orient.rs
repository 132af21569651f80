//! Orientation-indexing stage: score candidate orientations against the
//! associated spots, then refine residuals for the accepted grains.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use difsweep_core::{
    parse_bool, parse_float, parse_quit, AttrSpec, AttrTable, ConfigSource, ErrorInfo, ParamValue,
    QuitAfter, StageError, SweepError, SweepStage,
};

use crate::project::{AssocSpot, Candidate, Grain, PipelineState, Predicted, Project};

/// Config section holding the indexing stage's parameter lists.
pub const INDEX_SECTION: &str = "index";

/// Tunable options of the orientation-indexing stage.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexOptions {
    /// Match radius between a predicted reflection and an associated spot,
    /// pixels.
    pub hkl_tol: f64,
    /// Minimum completeness for a candidate to be accepted as a grain.
    pub min_fraction: f64,
    /// Also try the Friedel mate position of each unmatched prediction.
    pub use_friedel: bool,
    /// Early-termination directive for the search.
    pub quit_after: QuitAfter,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            hkl_tol: 1.0,
            min_fraction: 0.5,
            use_friedel: false,
            quit_after: QuitAfter::None,
        }
    }
}

fn set_hkl_tol(opts: &mut IndexOptions, value: &ParamValue) {
    opts.hkl_tol = value.expect_float();
}

fn set_min_fraction(opts: &mut IndexOptions, value: &ParamValue) {
    opts.min_fraction = value.expect_float();
}

fn set_use_friedel(opts: &mut IndexOptions, value: &ParamValue) {
    opts.use_friedel = value.expect_bool();
}

fn set_quit_after(opts: &mut IndexOptions, value: &ParamValue) {
    opts.quit_after = value.expect_quit();
}

const INDEX_ATTRS: [AttrSpec<IndexOptions>; 4] = [
    AttrSpec {
        name: "hkl_tol",
        parse: parse_float,
        set: set_hkl_tol,
    },
    AttrSpec {
        name: "min_fraction",
        parse: parse_float,
        set: set_min_fraction,
    },
    AttrSpec {
        name: "use_friedel",
        parse: parse_bool,
        set: set_use_friedel,
    },
    AttrSpec {
        name: "quit_after",
        parse: parse_quit,
        set: set_quit_after,
    },
];

fn nearest_match(spots: &[AssocSpot], x: f64, y: f64, tol: f64) -> Option<f64> {
    let mut best: Option<f64> = None;
    for spot in spots {
        let dx = spot.x - x;
        let dy = spot.y - y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist <= tol && best.map_or(true, |current| dist < current) {
            best = Some(dist);
        }
    }
    best
}

fn match_distance(spots: &[AssocSpot], pred_x: f64, pred_y: f64, opts: &IndexOptions) -> Option<f64> {
    nearest_match(spots, pred_x, pred_y, opts.hkl_tol).or_else(|| {
        if opts.use_friedel {
            nearest_match(spots, -pred_x, -pred_y, opts.hkl_tol)
        } else {
            None
        }
    })
}

fn considered_predictions<'a>(candidate: &'a Candidate, opts: &IndexOptions) -> &'a [Predicted] {
    match opts.quit_after {
        QuitAfter::Hkls(limit) => {
            let take = (limit as usize).min(candidate.predicted.len());
            &candidate.predicted[..take]
        }
        _ => &candidate.predicted,
    }
}

/// Scores every candidate orientation against the associated spots and
/// accepts those reaching `min_fraction` completeness, honouring the
/// quit-after directive. Residuals are left at zero for the refine pass.
pub fn search(assoc: &[AssocSpot], candidates: &[Candidate], opts: &IndexOptions) -> Vec<Grain> {
    let mut grains = Vec::new();
    for candidate in candidates {
        let predicted = considered_predictions(candidate, opts);
        if predicted.is_empty() {
            continue;
        }
        let matched = predicted
            .iter()
            .filter(|p| match_distance(assoc, p.x, p.y, opts).is_some())
            .count();
        let completeness = matched as f64 / predicted.len() as f64;
        if matched > 0 && completeness >= opts.min_fraction {
            grains.push(Grain {
                candidate: candidate.id.clone(),
                matched,
                predicted: predicted.len(),
                completeness,
                residual: 0.0,
            });
            if let QuitAfter::Grains(limit) = opts.quit_after {
                if grains.len() >= limit as usize {
                    break;
                }
            }
        }
    }
    grains
}

/// Computes the mean match residual for each accepted grain.
pub fn refine(
    assoc: &[AssocSpot],
    candidates: &[Candidate],
    grains: &mut [Grain],
    opts: &IndexOptions,
) {
    for grain in grains {
        let Some(candidate) = candidates.iter().find(|c| c.id == grain.candidate) else {
            continue;
        };
        let predicted = considered_predictions(candidate, opts);
        let mut total = 0.0;
        let mut matched = 0usize;
        for p in predicted {
            if let Some(dist) = match_distance(assoc, p.x, p.y, opts) {
                total += dist;
                matched += 1;
            }
        }
        if matched > 0 {
            grain.residual = total / matched as f64;
        }
    }
}

/// Sweepable wrapper around the indexing stage of a project pipeline.
pub struct IndexStage {
    project: Rc<Project>,
    state: Rc<RefCell<PipelineState>>,
    opts: IndexOptions,
    attrs: AttrTable<IndexOptions>,
    export_dir: Option<PathBuf>,
}

impl IndexStage {
    /// Resolves the stage's parameter table from the config source.
    pub fn from_config(
        cfg: &ConfigSource,
        project: Rc<Project>,
        state: Rc<RefCell<PipelineState>>,
    ) -> Result<Self, SweepError> {
        let attrs = AttrTable::from_config(cfg, INDEX_SECTION, &INDEX_ATTRS)?;
        Ok(Self {
            project,
            state,
            opts: IndexOptions::default(),
            attrs,
            export_dir: None,
        })
    }

    /// Enables per-run export of the grain list into `dir`.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }
}

impl SweepStage for IndexStage {
    fn stage_id(&self) -> &'static str {
        "index"
    }

    fn param_names(&self) -> Vec<&'static str> {
        self.attrs.param_names()
    }

    fn combo_count(&self) -> usize {
        self.attrs.combo_count()
    }

    fn combo_at(&self, idx: usize) -> Vec<ParamValue> {
        self.attrs.combo_at(idx)
    }

    fn bind(&mut self, combo: &[ParamValue]) {
        self.attrs.bind(&mut self.opts, combo);
    }

    fn phases(&self) -> &'static [&'static str] {
        &["search", "refine"]
    }

    fn run_phase(&mut self, phase: &'static str) -> Result<(), StageError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match phase {
            "search" => {
                if state.assoc.is_empty() {
                    return Err(StageError::new(
                        "no-input",
                        "no associated spots available for indexing",
                    ));
                }
                if self.project.candidates.is_empty() {
                    return Err(StageError::new(
                        "no-candidates",
                        "project has no candidate orientations",
                    ));
                }
                state.grains = search(&state.assoc, &self.project.candidates, &self.opts);
                Ok(())
            }
            "refine" => {
                refine(
                    &state.assoc,
                    &self.project.candidates,
                    &mut state.grains,
                    &self.opts,
                );
                Ok(())
            }
            other => Err(StageError::new(
                "unknown-phase",
                format!("index stage has no sub-phase `{other}`"),
            )),
        }
    }

    fn summary_columns(&self) -> &'static [&'static str] {
        &["num-grains", "num-indexed"]
    }

    fn summary_values(&self) -> Vec<String> {
        let state = self.state.borrow();
        let indexed: usize = state.grains.iter().map(|grain| grain.matched).sum();
        vec![state.grains.len().to_string(), indexed.to_string()]
    }

    fn export(&mut self, run_id: u64) -> Result<(), SweepError> {
        let Some(dir) = &self.export_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{run_id:04}_grains.csv"));
        let mut writer = csv::Writer::from_path(&path).map_err(|err| {
            SweepError::Export(
                ErrorInfo::new("index-export-open", "failed to create grain artifact")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let state = self.state.borrow();
        for grain in &state.grains {
            writer.serialize(grain).map_err(|err| {
                SweepError::Export(
                    ErrorInfo::new("index-export-write", "failed to write grain artifact")
                        .with_context("path", path.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
        }
        writer.flush().map_err(|err| {
            SweepError::Export(
                ErrorInfo::new("index-export-flush", "failed to flush grain artifact")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })
    }
}
