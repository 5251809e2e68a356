#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Client-side engine for `dragnet`: the coordinator protocol client, the
//! search subprocess supervisor, the adaptive range-size controller and the
//! multi-worker supervisor.

/// Public API for the engine crate.
pub mod api;

mod backend;
mod controller;
mod search;
mod supervisor;
mod worker;

pub use api::{StopHandle, SupervisorConfig, SupervisorHandle, start_supervisor};
