#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Stage graph planning for dstage
//!
//! Computes the deduplicated, topologically ordered closure of the
//! requested stages, derives the execution units that sequence them, and
//! wires every build invocation to the concrete tasks it will run. All
//! checks in this crate happen before any remote job is touched.

mod execution;
mod graph;
mod units;
pub mod wiring;

pub use execution::ExecutionPlan;
pub use units::{ExecutionUnit, ExecutionUnits};
pub use wiring::{wire, TaskCatalog, Wiring};

use dstage_errors::Error;
use dstage_types::Pipeline;

/// Plan the closure of the requested stages
///
/// # Errors
///
/// See [`ExecutionPlan::new`].
pub fn plan<S: AsRef<str>>(pipeline: &Pipeline, requested: &[S]) -> Result<ExecutionPlan, Error> {
    ExecutionPlan::new(pipeline, requested)
}
