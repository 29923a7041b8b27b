#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Stage execution for dstage
//!
//! Every stage of a plan runs as its own task. A stage waits on the
//! barriers of its dependencies, fans its invocations out to the
//! trigger/poll client under a process-wide concurrency limit, and
//! publishes its own status the moment it is decided. Dependents of a
//! failed stage are skipped without triggering anything.

mod orchestrator;
mod report;
mod resources;
mod stage;
mod state;

pub use orchestrator::{Orchestrator, RunPlan};
pub use resources::InvocationLimiter;
pub use stage::aggregate;
pub use state::RunState;
