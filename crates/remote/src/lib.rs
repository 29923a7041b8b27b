#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Remote invocation for dstage
//!
//! [`RemoteJobApi`] is the seam to the build server; [`JenkinsApi`] speaks
//! HTTP to a Jenkins-style job. [`TriggerPollClient`] drives one invocation
//! through baseline read, trigger, start detection and completion polling,
//! and turns every outcome into an [`dstage_types::InvocationReport`].

mod api;
mod client;
mod jenkins;

pub use api::{BuildStatus, RemoteJobApi};
pub use client::{InvocationContext, PollSettings, TriggerPollClient};
pub use jenkins::JenkinsApi;
