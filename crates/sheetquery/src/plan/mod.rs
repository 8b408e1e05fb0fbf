//! Extraction planning.
//!
//! A plan is a [`Program`] in a small pipeline language plus metadata. The
//! planner asks the completion collaborator for a program and falls back
//! to a template per intent type, so a plan is always available.

mod fallback;
mod planner;
mod program;
mod types;

pub use fallback::fallback_plan;
pub use planner::ExtractionPlanner;
pub use program::{AggregateFn, CoerceTo, ColumnRef, OutputShape, Program, Step};
pub use types::{repair_hint, ExtractionPlan, PlanFailure, PlanRequest};
