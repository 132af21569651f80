//! Parameter-sweep engine for diffraction analysis pipelines.
//!
//! The engine turns config-file sections into Cartesian products of typed
//! parameter combinations, binds each combination onto a stage's options
//! object, executes the stage's sub-phases under failure isolation with
//! per-sub-phase timing, and appends one fixed-schema row per run to a CSV
//! results table. The scientific stages themselves live behind the
//! [`SweepStage`] boundary.

mod attrs;
mod config;
mod errors;
mod hash;
mod params;
mod stage;
mod sweep;
mod table;

pub use attrs::{AttrSpec, AttrTable, GridProduct};
pub use config::ConfigSource;
pub use errors::{ErrorInfo, SweepError};
pub use hash::stable_hash_string;
pub use params::{parse_bool, parse_float, parse_int, parse_quit, ParamValue, QuitAfter};
pub use stage::{run_stage, PhaseTiming, StageError, StageOutcome, SweepStage};
pub use sweep::{run_sweep, RunReport, StageReport, SweepStats};
pub use table::{ColumnGroup, Schema, TableWriter};
