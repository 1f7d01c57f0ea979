//! Pipeline controller sequencing recognition, extraction, lookup and approval
//! for each uploaded deposit slip.

mod controller;
mod state;

pub use controller::{PipelineBuilder, PipelineController, RunOutcome};
pub use state::{NotFoundReason, PipelineState, StateChange};
