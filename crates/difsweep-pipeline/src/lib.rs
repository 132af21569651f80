//! Pipeline collaborator for the difsweep harness: the on-disk project,
//! the shared analysis state, and the sweepable stage wrappers for spot
//! detection and orientation indexing.
//!
//! The analysis routines here are deliberately thin; the harness only
//! needs stages with real sub-phases, mutable options, and countable
//! results behind the `SweepStage` boundary.

mod orient;
mod project;
mod spots;

pub use orient::{refine, search, IndexOptions, IndexStage, INDEX_SECTION};
pub use project::{AssocSpot, Candidate, Grain, Peak, PipelineState, Predicted, Project};
pub use spots::{associate, harvest, SpotOptions, SpotStage, SPOT_SECTION};
