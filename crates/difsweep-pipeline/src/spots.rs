//! Spot-detection stage: harvest raw maxima, then associate them across
//! adjacent frames.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use difsweep_core::{
    parse_float, parse_int, AttrSpec, AttrTable, ConfigSource, ErrorInfo, ParamValue, StageError,
    SweepError, SweepStage,
};

use crate::project::{AssocSpot, Peak, PipelineState, Project};

/// Config section holding the spot stage's parameter lists.
pub const SPOT_SECTION: &str = "spots";

/// Tunable options of the spot-detection stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotOptions {
    /// Minimum integrated intensity for a peak to become a spot.
    pub thresh: f64,
    /// Minimum connected pixel count.
    pub min_pix: u32,
    /// Association radius between adjacent frames, pixels.
    pub pix_tol: f64,
}

impl Default for SpotOptions {
    fn default() -> Self {
        Self {
            thresh: 0.0,
            min_pix: 1,
            pix_tol: 1.0,
        }
    }
}

fn set_thresh(opts: &mut SpotOptions, value: &ParamValue) {
    opts.thresh = value.expect_float();
}

fn set_min_pix(opts: &mut SpotOptions, value: &ParamValue) {
    opts.min_pix = value.expect_int() as u32;
}

fn set_pix_tol(opts: &mut SpotOptions, value: &ParamValue) {
    opts.pix_tol = value.expect_float();
}

const SPOT_ATTRS: [AttrSpec<SpotOptions>; 3] = [
    AttrSpec {
        name: "thresh",
        parse: parse_float,
        set: set_thresh,
    },
    AttrSpec {
        name: "min_pix",
        parse: parse_int,
        set: set_min_pix,
    },
    AttrSpec {
        name: "pix_tol",
        parse: parse_float,
        set: set_pix_tol,
    },
];

/// Applies the detection filters over the raw peak table.
pub fn harvest(peaks: &[Peak], opts: &SpotOptions) -> Vec<Peak> {
    peaks
        .iter()
        .filter(|peak| peak.intensity >= opts.thresh && peak.size >= opts.min_pix)
        .cloned()
        .collect()
}

struct Track {
    sum_x: f64,
    sum_y: f64,
    sum_intensity: f64,
    count: u32,
    last_frame: u32,
    last_x: f64,
    last_y: f64,
}

impl Track {
    fn open(peak: &Peak) -> Self {
        Self {
            sum_x: peak.x,
            sum_y: peak.y,
            sum_intensity: peak.intensity,
            count: 1,
            last_frame: peak.frame,
            last_x: peak.x,
            last_y: peak.y,
        }
    }

    fn extend(&mut self, peak: &Peak) {
        self.sum_x += peak.x;
        self.sum_y += peak.y;
        self.sum_intensity += peak.intensity;
        self.count += 1;
        self.last_frame = peak.frame;
        self.last_x = peak.x;
        self.last_y = peak.y;
    }

    fn close(self) -> AssocSpot {
        AssocSpot {
            x: self.sum_x / self.count as f64,
            y: self.sum_y / self.count as f64,
            frames: self.count,
            intensity: self.sum_intensity,
        }
    }
}

/// Merges harvested spots across adjacent frames: a spot extends an open
/// track when it sits on the next frame within `pix_tol` of the track's
/// last position; otherwise it opens a track of its own.
pub fn associate(spots: &[Peak], opts: &SpotOptions) -> Vec<AssocSpot> {
    let mut ordered: Vec<&Peak> = spots.iter().collect();
    ordered.sort_by(|a, b| {
        a.frame
            .cmp(&b.frame)
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
    });

    let mut open: Vec<Track> = Vec::new();
    let mut merged: Vec<AssocSpot> = Vec::new();
    for peak in ordered {
        // Tracks that ended before the previous frame can never extend.
        let mut still_open = Vec::with_capacity(open.len());
        for track in open.drain(..) {
            if track.last_frame + 1 < peak.frame {
                merged.push(track.close());
            } else {
                still_open.push(track);
            }
        }
        open = still_open;

        let slot = open.iter().position(|track| {
            track.last_frame + 1 == peak.frame
                && (track.last_x - peak.x).abs() <= opts.pix_tol
                && (track.last_y - peak.y).abs() <= opts.pix_tol
        });
        match slot {
            Some(idx) => open[idx].extend(peak),
            None => open.push(Track::open(peak)),
        }
    }
    merged.extend(open.into_iter().map(Track::close));
    merged
}

/// Sweepable wrapper around the detection stage of a project pipeline.
pub struct SpotStage {
    project: Rc<Project>,
    state: Rc<RefCell<PipelineState>>,
    opts: SpotOptions,
    attrs: AttrTable<SpotOptions>,
    export_dir: Option<PathBuf>,
}

impl SpotStage {
    /// Resolves the stage's parameter table from the config source.
    pub fn from_config(
        cfg: &ConfigSource,
        project: Rc<Project>,
        state: Rc<RefCell<PipelineState>>,
    ) -> Result<Self, SweepError> {
        let attrs = AttrTable::from_config(cfg, SPOT_SECTION, &SPOT_ATTRS)?;
        Ok(Self {
            project,
            state,
            opts: SpotOptions::default(),
            attrs,
            export_dir: None,
        })
    }

    /// Enables per-run export of the associated spot table into `dir`.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }
}

impl SweepStage for SpotStage {
    fn stage_id(&self) -> &'static str {
        "spots"
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
        &["raw", "assoc"]
    }

    fn run_phase(&mut self, phase: &'static str) -> Result<(), StageError> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        match phase {
            "raw" => {
                state.spots = harvest(&self.project.peaks, &self.opts);
                Ok(())
            }
            "assoc" => {
                if state.spots.is_empty() {
                    return Err(StageError::new(
                        "no-spots",
                        "detection produced no spots to associate",
                    ));
                }
                state.assoc = associate(&state.spots, &self.opts);
                Ok(())
            }
            other => Err(StageError::new(
                "unknown-phase",
                format!("spot stage has no sub-phase `{other}`"),
            )),
        }
    }

    fn summary_columns(&self) -> &'static [&'static str] {
        &["num-spots", "num-assoc"]
    }

    fn summary_values(&self) -> Vec<String> {
        let state = self.state.borrow();
        vec![state.spots.len().to_string(), state.assoc.len().to_string()]
    }

    fn export(&mut self, run_id: u64) -> Result<(), SweepError> {
        let Some(dir) = &self.export_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{run_id:04}_assoc.csv"));
        let mut writer = csv::Writer::from_path(&path).map_err(|err| {
            SweepError::Export(
                ErrorInfo::new("spots-export-open", "failed to create spot artifact")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let state = self.state.borrow();
        for spot in &state.assoc {
            writer.serialize(spot).map_err(|err| {
                SweepError::Export(
                    ErrorInfo::new("spots-export-write", "failed to write spot artifact")
                        .with_context("path", path.display().to_string())
                        .with_hint(err.to_string()),
                )
            })?;
        }
        writer.flush().map_err(|err| {
            SweepError::Export(
                ErrorInfo::new("spots-export-flush", "failed to flush spot artifact")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })
    }
}
