//! The on-disk experiment the sweep operates on, plus the mutable analysis
//! state its stages share.

use std::fs;
use std::path::{Path, PathBuf};

use difsweep_core::{ErrorInfo, SweepError};
use serde::{Deserialize, Serialize};

/// One raw detector maximum from the project peak table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Frame the maximum was observed on.
    pub frame: u32,
    /// Detector column, pixels.
    pub x: f64,
    /// Detector row, pixels.
    pub y: f64,
    /// Integrated intensity.
    pub intensity: f64,
    /// Connected pixel count.
    pub size: u32,
}

/// A spot merged across adjacent frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssocSpot {
    /// Centroid column, pixels.
    pub x: f64,
    /// Centroid row, pixels.
    pub y: f64,
    /// Number of frames the spot spans.
    pub frames: u32,
    /// Summed intensity over the span.
    pub intensity: f64,
}

/// Predicted reflection position of a candidate orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicted {
    /// Predicted column, pixels.
    pub x: f64,
    /// Predicted row, pixels.
    pub y: f64,
}

/// A candidate orientation with its predicted reflection list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate identifier.
    pub id: String,
    /// Predicted reflections, in ranking order.
    pub predicted: Vec<Predicted>,
}

/// An accepted orientation solution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grain {
    /// Candidate the grain was accepted from.
    pub candidate: String,
    /// Predicted reflections matched by an associated spot.
    pub matched: usize,
    /// Predicted reflections considered.
    pub predicted: usize,
    /// matched / predicted.
    pub completeness: f64,
    /// Mean match residual in pixels. Filled in by the refine pass.
    pub residual: f64,
}

/// On-disk experiment: peak table, candidate orientations, and an optional
/// pre-associated spot table used when the detection stage is not swept.
#[derive(Debug, Clone)]
pub struct Project {
    /// Project directory.
    pub root: PathBuf,
    /// Raw detector maxima from `peaks.csv`.
    pub peaks: Vec<Peak>,
    /// Candidate orientations from `candidates.yaml`, if present.
    pub candidates: Vec<Candidate>,
    /// Pre-associated spots from `assoc.csv`, if present.
    pub baseline_assoc: Vec<AssocSpot>,
}

impl Project {
    /// Loads a project directory. `peaks.csv` is required; the candidate
    /// and baseline association tables are optional.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, SweepError> {
        let root = root.into();
        let peaks = read_peaks(&root.join("peaks.csv"))?;
        let candidates_path = root.join("candidates.yaml");
        let candidates = if candidates_path.exists() {
            read_candidates(&candidates_path)?
        } else {
            Vec::new()
        };
        let assoc_path = root.join("assoc.csv");
        let baseline_assoc = if assoc_path.exists() {
            read_assoc(&assoc_path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            root,
            peaks,
            candidates,
            baseline_assoc,
        })
    }

    /// Path of a config file inside the project directory.
    pub fn config_path(&self, basename: &str) -> PathBuf {
        self.root.join(format!("{basename}.yaml"))
    }

    /// Path of the sweep result table.
    pub fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.csv"))
    }

    /// Path of the sweep manifest.
    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.meta.json"))
    }

    /// Directory receiving per-run artifact files.
    pub fn artifact_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}_runs"))
    }
}

/// Mutable analysis state shared by the stages of one sweep. Rebinding and
/// re-execution overwrite it wholesale before every use; nothing resets it
/// between runs.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Spots retained by the detection filters.
    pub spots: Vec<Peak>,
    /// Spots merged across frames.
    pub assoc: Vec<AssocSpot>,
    /// Accepted orientation solutions.
    pub grains: Vec<Grain>,
}

impl PipelineState {
    /// Starts from the project's pre-associated spot table, so an
    /// indexing-only sweep has input without running detection.
    pub fn seeded(project: &Project) -> Self {
        Self {
            assoc: project.baseline_assoc.clone(),
            ..Self::default()
        }
    }
}

fn read_peaks(path: &Path) -> Result<Vec<Peak>, SweepError> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| {
        SweepError::Io(
            ErrorInfo::new("project-peaks-open", "failed to open project peak table")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    let mut peaks = Vec::new();
    for record in reader.deserialize() {
        let peak: Peak = record.map_err(|err| {
            SweepError::Io(
                ErrorInfo::new("project-peaks-record", "malformed peak table record")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        peaks.push(peak);
    }
    Ok(peaks)
}

fn read_assoc(path: &Path) -> Result<Vec<AssocSpot>, SweepError> {
    let mut reader = csv::Reader::from_path(path).map_err(|err| {
        SweepError::Io(
            ErrorInfo::new("project-assoc-open", "failed to open association table")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    let mut spots = Vec::new();
    for record in reader.deserialize() {
        let spot: AssocSpot = record.map_err(|err| {
            SweepError::Io(
                ErrorInfo::new("project-assoc-record", "malformed association record")
                    .with_context("path", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        spots.push(spot);
    }
    Ok(spots)
}

fn read_candidates(path: &Path) -> Result<Vec<Candidate>, SweepError> {
    let text = fs::read_to_string(path).map_err(|err| {
        SweepError::Io(
            ErrorInfo::new("project-candidates-read", "failed to read candidate list")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })?;
    serde_yaml::from_str(&text).map_err(|err| {
        SweepError::Io(
            ErrorInfo::new("project-candidates-parse", "malformed candidate list")
                .with_context("path", path.display().to_string())
                .with_hint(err.to_string()),
        )
    })
}
